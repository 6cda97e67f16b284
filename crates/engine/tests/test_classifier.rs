//! Tests for error classification

use toolshell_engine::{ErrorClassifier, ErrorKind};

fn kind(raw: &str) -> ErrorKind {
    ErrorClassifier::new().classify_kind(raw)
}

fn missing(field: &str) -> ErrorKind {
    ErrorKind::MissingParameter {
        field: field.to_string(),
    }
}

#[test]
fn test_missing_parameter_patterns() {
    assert_eq!(
        kind("ERROR: (gcloud.compute.instances.stop) Specify the [--zone] flag."),
        missing("zone")
    );
    assert_eq!(kind("missing required parameter: bucket"), missing("bucket"));
    assert_eq!(kind("Missing argument 'owner'"), missing("owner"));
    assert_eq!(kind("argument --project is required"), missing("project"));
    assert_eq!(kind("required flag --region not set"), missing("region"));
}

#[test]
fn test_argument_must_be_specified() {
    assert_eq!(
        kind("ERROR: (gcloud.compute.instances.stop) argument --zone: Must be specified."),
        missing("zone")
    );
    assert_eq!(
        kind("ERROR: (gcloud.compute.addresses.create) argument --region: must be specified."),
        missing("region")
    );
}

#[test]
fn test_set_machine_type_on_running_instance() {
    assert_eq!(
        kind("ERROR: (gcloud.compute.instances.set-machine-type) Could not fetch resource:\n - Instance vm-1 was not found"),
        ErrorKind::ResizeWhileRunning
    );
    assert_eq!(
        kind("set-machine-type: cannot change machine type of a RUNNING instance"),
        ErrorKind::ResizeWhileRunning
    );
    // Other not-found errors stay not-found
    assert_eq!(
        kind("ERROR: (gcloud.compute.instances.start) Could not fetch resource:"),
        ErrorKind::NotFound
    );

    let info = ErrorClassifier::new().classify("Cannot set-machine-type on running VM");
    assert!(info.message.contains("Stop it, run set-machine-type, then start it again."));
}

#[test]
fn test_not_found_patterns() {
    assert_eq!(
        kind("ERROR: (gcloud.compute.instances.describe) Could not fetch resource:"),
        ErrorKind::NotFound
    );
    assert_eq!(kind("The instance vm-9 was not found"), ErrorKind::NotFound);
    assert_eq!(kind("open /tmp/x: no such file or directory"), ErrorKind::NotFound);
}

#[test]
fn test_permission_patterns() {
    assert_eq!(kind("PERMISSION_DENIED: caller"), ErrorKind::PermissionDenied);
    assert_eq!(kind("ERROR: permission denied"), ErrorKind::PermissionDenied);
    assert_eq!(
        kind("user x does not have permission to access bucket"),
        ErrorKind::PermissionDenied
    );
    assert_eq!(kind("Access Denied"), ErrorKind::PermissionDenied);
}

#[test]
fn test_invalid_value_captures_field() {
    assert_eq!(
        kind("ERROR: Invalid value for [--machine-type]: 'huge'"),
        ErrorKind::InvalidValue {
            field: "machine-type".to_string()
        }
    );
    assert_eq!(
        kind("invalid value for field state"),
        ErrorKind::InvalidValue {
            field: "state".to_string()
        }
    );
}

#[test]
fn test_rule_order_first_match_wins() {
    // Both missing-parameter and not-found text present
    assert_eq!(
        kind("Specify the [--zone] flag; instance was not found"),
        missing("zone")
    );
    // Not-found outranks permission
    assert_eq!(
        kind("bucket not found or permission denied"),
        ErrorKind::NotFound
    );
}

#[test]
fn test_unclassified_keeps_raw() {
    let info = ErrorClassifier::new().classify("\n  something odd happened\nsecond line");
    assert_eq!(info.kind, ErrorKind::Unclassified);
    assert_eq!(info.message, "Command failed: something odd happened");
    assert_eq!(info.raw, "\n  something odd happened\nsecond line");
}

#[test]
fn test_message_templates() {
    let classifier = ErrorClassifier::new();

    let info = classifier.classify("Specify the [--zone] flag");
    assert_eq!(
        info.message,
        "A required parameter is missing: 'zone'. Provide a value for 'zone' and try again."
    );

    let info = classifier.classify("Invalid value for [--size]");
    assert_eq!(
        info.message,
        "Invalid value provided for 'size'. Check the accepted values for this field."
    );

    let info = classifier.classify("does not have permission");
    assert!(info.message.starts_with("Permission denied."));
}
