//! Client profiles
//!
//! A profile bundles everything that differs between tool servers: the
//! translator's system instruction, how a command string maps onto a tool
//! call, and which tool (if any) runs as an iterative thought sequence.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How a command string becomes a tool call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "style", rename_all = "snake_case")]
pub enum CommandStyleConfig {
    /// `tool key=value ...`
    #[default]
    KeyValue,
    /// Whole line passed as a list of strings under one argument of a fixed tool
    Argv {
        tool: String,
        argument: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        strip_prefix: Option<String>,
    },
}

/// Argument keys of the iterative thought tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThoughtToolConfig {
    #[serde(default = "default_thought_tool")]
    pub name: String,
    #[serde(default = "default_continue_key")]
    pub continue_key: String,
    #[serde(default = "default_number_key")]
    pub number_key: String,
    #[serde(default = "default_total_key")]
    pub total_key: String,
}

impl Default for ThoughtToolConfig {
    fn default() -> Self {
        Self {
            name: default_thought_tool(),
            continue_key: default_continue_key(),
            number_key: default_number_key(),
            total_key: default_total_key(),
        }
    }
}

fn default_thought_tool() -> String {
    "sequentialthinking".to_string()
}

fn default_continue_key() -> String {
    "nextThoughtNeeded".to_string()
}

fn default_number_key() -> String {
    "thoughtNumber".to_string()
}

fn default_total_key() -> String {
    "totalThoughts".to_string()
}

fn default_prompt() -> String {
    "toolshell".to_string()
}

/// One client profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileConfig {
    /// REPL prompt label
    #[serde(default = "default_prompt")]
    pub prompt: String,
    #[serde(default)]
    pub system_instruction: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought_tool: Option<ThoughtToolConfig>,
    #[serde(default)]
    pub command_style: CommandStyleConfig,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            prompt: default_prompt(),
            system_instruction: GENERIC_INSTRUCTION.to_string(),
            endpoint_url: None,
            thought_tool: None,
            command_style: CommandStyleConfig::KeyValue,
        }
    }
}

/// Built-in profiles keyed by name
pub fn builtin_profiles() -> BTreeMap<String, ProfileConfig> {
    let mut profiles = BTreeMap::new();

    profiles.insert("generic".to_string(), ProfileConfig::default());

    profiles.insert(
        "sequential-thinking".to_string(),
        ProfileConfig {
            prompt: "sequential".to_string(),
            system_instruction: SEQUENTIAL_THINKING_INSTRUCTION.to_string(),
            thought_tool: Some(ThoughtToolConfig::default()),
            ..ProfileConfig::default()
        },
    );

    profiles.insert(
        "gcloud".to_string(),
        ProfileConfig {
            prompt: "gcloud".to_string(),
            system_instruction: GCLOUD_INSTRUCTION.to_string(),
            command_style: CommandStyleConfig::Argv {
                tool: "run_gcloud_command".to_string(),
                argument: "args".to_string(),
                strip_prefix: Some("gcloud".to_string()),
            },
            ..ProfileConfig::default()
        },
    );

    profiles.insert(
        "storage".to_string(),
        ProfileConfig {
            prompt: "storage".to_string(),
            system_instruction: STORAGE_INSTRUCTION.to_string(),
            ..ProfileConfig::default()
        },
    );

    profiles.insert(
        "github".to_string(),
        ProfileConfig {
            prompt: "github".to_string(),
            system_instruction: GITHUB_INSTRUCTION.to_string(),
            ..ProfileConfig::default()
        },
    );

    profiles.insert(
        "filesystem".to_string(),
        ProfileConfig {
            prompt: "fs".to_string(),
            system_instruction: FILESYSTEM_INSTRUCTION.to_string(),
            ..ProfileConfig::default()
        },
    );

    profiles
}

const OUTPUT_RULES: &str = r#"Output rules:
- Return ONLY the command string: tool_name key=value key2="value with spaces"
- Lists and objects are written as JSON, e.g. paths=["a.txt","b.txt"]
- No markdown, no explanations.
- If required information is missing, return a message starting with "Need more info:".
- For operations that need several calls in order, return "Multi-step:" followed by the
  commands separated by " && "."#;

const GENERIC_INSTRUCTION: &str = r#"You translate a user's natural language request into a single tool call for a tool server.
If the input already is a tool call, return it unchanged."#;

const SEQUENTIAL_THINKING_INSTRUCTION: &str = r#"You translate the user's thought or problem into a 'sequentialthinking' tool call and keep
track of the thinking process across turns.

Tool: sequentialthinking
Arguments:
- thought (string): the current thinking step
- nextThoughtNeeded (boolean): whether another thought step is needed
- thoughtNumber (integer): current thought number
- totalThoughts (integer): estimated total thoughts needed
- isRevision (boolean, optional)
- revisesThought (integer, optional)
- branchFromThought (integer, optional)
- branchId (string, optional)
- needsMoreThoughts (boolean, optional)

Example:
User: "First, I need to analyze the problem."
Output: sequentialthinking thought="First, I need to analyze the problem." thoughtNumber=1 totalThoughts=5 nextThoughtNeeded=true"#;

const GCLOUD_INSTRUCTION: &str = r#"You translate the user's request into gcloud command arguments.
- Return only the arguments, without the 'gcloud' prefix.
- If the input already is a gcloud command (compute, projects, storage, recommender ...), return it as is.
- Never use placeholders such as PROJECT_ID; ask with "Need more info:" instead.
- Changing a machine type requires stopping the instance first, for example:
  Multi-step: compute instances stop vm-1 --zone us-central1-a && compute instances set-machine-type vm-1 --machine-type e2-small --zone us-central1-a && compute instances start vm-1 --zone us-central1-a"#;

const STORAGE_INSTRUCTION: &str = r#"You translate the user's request into a Google Cloud Storage tool call.
Tools:
- list_buckets(project_id)
- list_objects(bucket, prefix optional)
- read_object_content(bucket, object)
- get_bucket_metadata(bucket)
- get_bucket_location(bucket)"#;

const GITHUB_INSTRUCTION: &str = r#"You translate the user's request into a GitHub tool call.
Common tools: search_repositories(query), get_file_contents(owner, repo, path),
list_issues(owner, repo, state optional), create_issue(owner, repo, title, body optional),
list_pull_requests(owner, repo, state optional)."#;

const FILESYSTEM_INSTRUCTION: &str = r#"You translate the user's request into a filesystem tool call.
Common tools: list_directory(path), read_file(path), write_file(path, content),
create_directory(path), move_file(source, destination), search_files(path, pattern),
get_file_info(path), list_allowed_directories()."#;

impl ProfileConfig {
    /// System instruction including the shared output rules
    pub fn full_instruction(&self) -> String {
        if self.system_instruction.is_empty() {
            OUTPUT_RULES.to_string()
        } else {
            format!("{}\n\n{}", self.system_instruction.trim_end(), OUTPUT_RULES)
        }
    }
}
