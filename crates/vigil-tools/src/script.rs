//! Local script tools: a `tools.json` definition file plus one script per
//! tool in the same directory.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use vigil_types::{Provenance, ToolDefinition, ToolDescriptor, ToolError};

use crate::process::combined_output;

/// Definition file inside the tools directory.
pub const DEFINITION_FILE: &str = "tools.json";

/// Extensions tried, in order, when locating a tool's script. A file with
/// no extension is tried last.
pub const SCRIPT_EXTENSIONS: [&str; 4] = [".py", ".sh", ".bat", ".cmd"];

/// Read the tool definitions in `dir`.
///
/// A missing or malformed file yields no tools.
pub fn load_definitions(dir: &Path) -> Vec<ToolDescriptor> {
    let path = dir.join(DEFINITION_FILE);
    let text = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(_) => return Vec::new(),
    };
    let definitions: Vec<ToolDefinition> = match serde_json::from_str(&text) {
        Ok(defs) => defs,
        Err(e) => {
            tracing::warn!("Error parsing {}: {e}", path.display());
            return Vec::new();
        }
    };
    definitions
        .into_iter()
        .map(|def| {
            let script = find_script(dir, &def.function.name);
            ToolDescriptor::from_definition(def, Provenance::Script { script })
        })
        .collect()
}

/// Locate the script for `name` by exact file-name match.
pub fn find_script(dir: &Path, name: &str) -> Option<PathBuf> {
    // Tool names come from the model; never let them leave the directory.
    if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
        return None;
    }
    SCRIPT_EXTENSIONS
        .iter()
        .chain(std::iter::once(&""))
        .map(|ext| dir.join(format!("{name}{ext}")))
        .find(|p| p.is_file())
}

/// Program and leading arguments that run `script`.
fn interpreter(script: &Path) -> (PathBuf, Vec<PathBuf>) {
    let ext = script
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase());
    let script = script.to_path_buf();
    match ext.as_deref() {
        Some("py") => ("python".into(), vec![script]),
        Some("sh") => ("bash".into(), vec![script]),
        Some("bat") | Some("cmd") => ("cmd.exe".into(), vec!["/c".into(), script]),
        _ => (script, Vec::new()),
    }
}

/// Turn the model's raw argument string into CLI flags.
///
/// A JSON object becomes `--key value` pairs in field order. Text that is
/// not JSON becomes `--command <raw>`; broken JSON is passed through as-is.
pub fn marshal_arguments(raw: &str) -> Vec<String> {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Object(map)) => map
            .iter()
            .flat_map(|(key, value)| [format!("--{key}"), crate::value_text(value)])
            .collect(),
        _ if raw.trim_start().starts_with('{') => {
            tracing::warn!("Failed to parse arguments JSON, passing raw");
            vec![raw.to_string()]
        }
        _ => vec!["--command".to_string(), raw.to_string()],
    }
}

/// Run `script` with marshalled arguments and return its full output.
///
/// The working directory is the script's directory. Output is not truncated.
pub async fn run_script(script: &Path, raw_arguments: &str) -> Result<String, ToolError> {
    let (program, leading) = interpreter(script);
    let mut cmd = Command::new(&program);
    cmd.args(&leading)
        .args(marshal_arguments(raw_arguments))
        .stdin(Stdio::null());
    if let Some(dir) = script.parent() {
        cmd.current_dir(dir);
    }
    tracing::info!("Running script tool {}", script.display());

    let (text, _status) = combined_output(cmd)
        .await
        .map_err(|e| ToolError::ExecutionFailed(format!("{}: {e}", program.display())))?;
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, body: &str) {
        std::fs::write(dir.join(name), body).unwrap();
    }

    #[test]
    fn marshals_object_fields_as_flags() {
        assert_eq!(
            marshal_arguments(r#"{"target": "10.0.0.1", "ports": 80, "fast": true}"#),
            vec!["--target", "10.0.0.1", "--ports", "80", "--fast", "true"]
        );
    }

    #[test]
    fn marshals_plain_text_as_command_flag() {
        assert_eq!(marshal_arguments("whoami"), vec!["--command", "whoami"]);
    }

    #[test]
    fn broken_json_is_passed_raw() {
        assert_eq!(marshal_arguments("{not json"), vec!["{not json"]);
    }

    #[test]
    fn find_script_follows_extension_order() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "scan", "");
        write(dir.path(), "scan.sh", "");
        write(dir.path(), "scan.bat", "");
        assert_eq!(
            find_script(dir.path(), "scan").unwrap(),
            dir.path().join("scan.sh")
        );
        write(dir.path(), "scan.py", "");
        assert_eq!(
            find_script(dir.path(), "scan").unwrap(),
            dir.path().join("scan.py")
        );
    }

    #[test]
    fn find_script_falls_back_to_bare_name() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "probe", "");
        assert_eq!(
            find_script(dir.path(), "probe").unwrap(),
            dir.path().join("probe")
        );
        assert!(find_script(dir.path(), "absent").is_none());
    }

    #[test]
    fn find_script_rejects_path_escapes() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_script(dir.path(), "../etc/passwd").is_none());
        assert!(find_script(dir.path(), "").is_none());
    }

    #[test]
    fn load_definitions_resolves_scripts() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            DEFINITION_FILE,
            r#"[
                {"type": "function", "function": {"name": "scan", "description": "Port scan",
                 "parameters": {"type": "object", "properties": {"host": {"type": "string"}}}}},
                {"type": "function", "function": {"name": "ghost", "description": "No script"}}
            ]"#,
        );
        write(dir.path(), "scan.sh", "");

        let tools = load_definitions(dir.path());
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].name, "scan");
        assert_eq!(
            tools[0].provenance,
            Provenance::Script {
                script: Some(dir.path().join("scan.sh"))
            }
        );
        assert_eq!(tools[1].provenance, Provenance::Script { script: None });
    }

    #[test]
    fn malformed_definition_file_yields_nothing() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), DEFINITION_FILE, "{ this is not an array");
        assert!(load_definitions(dir.path()).is_empty());
        let empty = tempfile::tempdir().unwrap();
        assert!(load_definitions(empty.path()).is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn runs_script_in_its_directory_with_flags() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "report.sh",
            "echo \"args: $*\"\nls\necho oops 1>&2\n",
        );
        let out = run_script(&dir.path().join("report.sh"), r#"{"host": "a b"}"#)
            .await
            .unwrap();
        assert_eq!(out, "args: --host a b\nreport.sh\noops\n");
    }
}
