use crate::config::namespace::NamespacePolicy;
use crate::config::types::{FaultKind, Result};
use crate::judge::adapter::LanguageAdapter;
use std::path::Path;

/// Exit status the bootstrap uses for a snippet that does not compile
/// (sysexits `EX_DATAERR`).
pub const EXIT_COMPILE_FAULT: i32 = 65;
/// Exit status the bootstrap uses for an unhandled exception
/// (sysexits `EX_SOFTWARE`).
pub const EXIT_RUNTIME_FAULT: i32 = 70;

/// Interpreter-side driver. Reads the snippet from stdin, compiles it as
/// `<snippet>`, and runs it against a namespace holding only the allow-listed
/// builtins passed in argv[1]. Fault traces go to stderr with the driver's own
/// frame removed.
const BOOTSTRAP: &str = r#"import builtins, json, sys, traceback

def _run():
    allowed = json.loads(sys.argv[1])
    source = sys.stdin.read()
    namespace = {
        "__builtins__": {n: getattr(builtins, n) for n in allowed if hasattr(builtins, n)},
        "__name__": "__main__",
    }
    try:
        code = compile(source, "<snippet>", "exec")
    except (SyntaxError, ValueError) as exc:
        traceback.print_exception(type(exc), exc, None)
        return 65
    try:
        exec(code, namespace)
    except SystemExit as exc:
        if exc.code is None or exc.code == 0:
            return 0
        traceback.print_exception(type(exc), exc, exc.__traceback__.tb_next)
        return 70
    except BaseException as exc:
        traceback.print_exception(type(exc), exc, exc.__traceback__.tb_next)
        return 70
    return 0

sys.exit(_run())
"#;

#[derive(Debug, Clone, Default)]
pub struct PythonAdapter;

impl LanguageAdapter for PythonAdapter {
    fn language(&self) -> &'static str {
        "python"
    }

    fn display_name(&self) -> &'static str {
        "Python"
    }

    fn run_command(&self, interpreter: &Path, namespace: &NamespacePolicy) -> Result<Vec<String>> {
        // -I: ignore PYTHON* env and user site, -S: no site import,
        // -B: no .pyc writes, -u: unbuffered so pre-timeout output reaches the pipe.
        Ok(vec![
            interpreter.to_string_lossy().to_string(),
            "-I".to_string(),
            "-S".to_string(),
            "-B".to_string(),
            "-u".to_string(),
            "-X".to_string(),
            "utf8".to_string(),
            "-c".to_string(),
            BOOTSTRAP.to_string(),
            namespace.to_json()?,
        ])
    }

    fn version_command(&self, interpreter: &Path) -> Vec<String> {
        vec![
            interpreter.to_string_lossy().to_string(),
            "--version".to_string(),
        ]
    }

    fn classify_exit(&self, exit_code: Option<i32>, signal: Option<i32>) -> Option<FaultKind> {
        match (exit_code, signal) {
            (Some(0), None) => None,
            (Some(EXIT_COMPILE_FAULT), None) => Some(FaultKind::Compile),
            _ => Some(FaultKind::Runtime),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_run_command_passes_allow_list_as_last_arg() {
        let adapter = PythonAdapter;
        let argv = adapter
            .run_command(&PathBuf::from("/usr/bin/python3"), &NamespacePolicy::print_only())
            .unwrap();

        assert_eq!(argv[0], "/usr/bin/python3");
        assert!(argv.contains(&"-I".to_string()));
        assert!(argv.contains(&"-u".to_string()));
        assert_eq!(argv.last().unwrap(), r#"["print"]"#);
        assert_eq!(argv[argv.len() - 3], "-c");
    }

    #[test]
    fn test_run_command_rejects_bad_namespace() {
        let adapter = PythonAdapter;
        let namespace = NamespacePolicy {
            builtins: vec!["__import__('os')".to_string()],
            allow_imports: false,
        };
        assert!(adapter
            .run_command(&PathBuf::from("/usr/bin/python3"), &namespace)
            .is_err());
    }

    #[test]
    fn test_classify_exit() {
        let adapter = PythonAdapter;
        assert_eq!(adapter.classify_exit(Some(0), None), None);
        assert_eq!(
            adapter.classify_exit(Some(EXIT_COMPILE_FAULT), None),
            Some(FaultKind::Compile)
        );
        assert_eq!(
            adapter.classify_exit(Some(EXIT_RUNTIME_FAULT), None),
            Some(FaultKind::Runtime)
        );
        assert_eq!(adapter.classify_exit(Some(1), None), Some(FaultKind::Runtime));
        assert_eq!(adapter.classify_exit(None, Some(9)), Some(FaultKind::Runtime));
    }

    #[test]
    fn test_bootstrap_exit_codes_match_constants() {
        assert_eq!((EXIT_COMPILE_FAULT, EXIT_RUNTIME_FAULT), (65, 70));
        assert!(BOOTSTRAP.contains(&format!("return {}", EXIT_COMPILE_FAULT)));
        assert!(BOOTSTRAP.contains(&format!("return {}", EXIT_RUNTIME_FAULT)));
    }
}
