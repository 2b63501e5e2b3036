//! Stay-open protocol constants and command builders
//!
//! exiftool started with `-stay_open True -@ -` reads arguments from stdin,
//! one per line, and runs them when it sees `-execute`:
//!
//! ```text
//! exiftool -stay_open True -@ - -common_args <common args...>
//!
//! stdin:  <per-request flags...>   stdout:  <json>
//!         -j                                {ready}
//!         -g2
//!         <target>
//!         -execute
//! ```
//!
//! There is no request identifier on the wire; responses are matched to
//! requests purely by order.

/// Default executable name
pub const EXIFTOOL_COMMAND: &str = "exiftool";

/// Enables or disables stay-open mode
pub const STAY_OPEN_ARG: &str = "-stay_open";

/// Runs the arguments collected since the previous execute
pub const EXECUTE_ARG: &str = "-execute";

/// Read arguments from a file; `-` means stdin
pub const ARGFILE_ARG: &str = "-@";

/// Everything after this is appended to every executed command
pub const COMMON_ARGS_ARG: &str = "-common_args";

/// JSON output
pub const JSON_ARG: &str = "-j";

/// Group tags by category (family 2 groups)
pub const GROUP_ARG: &str = "-g2";

/// Ready token terminating each response
pub const READY_TOKEN_LF: &[u8] = b"{ready}\n";

/// Ready token on platforms writing CRLF line endings
pub const READY_TOKEN_CRLF: &[u8] = b"{ready}\r\n";

/// Full command line for a stay-open process with `common_args` appended
pub fn startup_args(common_args: &[String]) -> Vec<String> {
    let mut args = vec![
        STAY_OPEN_ARG.to_string(),
        "True".to_string(),
        ARGFILE_ARG.to_string(),
        "-".to_string(),
        COMMON_ARGS_ARG.to_string(),
    ];
    args.extend(common_args.iter().cloned());
    args
}

/// Lines written to stdin for one request, in wire order
pub fn request_lines<S: AsRef<str>>(flags: &[S], target: &str) -> Vec<String> {
    let mut lines: Vec<String> = flags.iter().map(|f| f.as_ref().to_string()).collect();
    lines.push(JSON_ARG.to_string());
    lines.push(GROUP_ARG.to_string());
    lines.push(target.to_string());
    lines.push(EXECUTE_ARG.to_string());
    lines
}

/// Lines that make the process leave stay-open mode and exit
pub fn shutdown_lines() -> [&'static str; 3] {
    [STAY_OPEN_ARG, "False", EXECUTE_ARG]
}

/// Check whether `line` can be sent as a single protocol line
pub fn is_valid_line(line: &str) -> bool {
    !line.contains(['\n', '\r', '\0'])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_startup_args() {
        let args = startup_args(&["-n".to_string(), "-charset".to_string()]);
        assert_eq!(
            args,
            vec!["-stay_open", "True", "-@", "-", "-common_args", "-n", "-charset"]
        );
    }

    #[test]
    fn test_request_lines_order() {
        let lines = request_lines(&["-fast", "-api"], "/photos/a.jpg");
        assert_eq!(
            lines,
            vec!["-fast", "-api", "-j", "-g2", "/photos/a.jpg", "-execute"]
        );

        let no_flags: [&str; 0] = [];
        assert_eq!(
            request_lines(&no_flags, "b.jpg"),
            vec!["-j", "-g2", "b.jpg", "-execute"]
        );
    }

    #[test]
    fn test_shutdown_lines() {
        assert_eq!(shutdown_lines(), ["-stay_open", "False", "-execute"]);
    }

    #[test]
    fn test_line_validation() {
        assert!(is_valid_line("/photos/with space.jpg"));
        assert!(!is_valid_line("a.jpg\n-execute"));
        assert!(!is_valid_line("a.jpg\r"));
        assert!(!is_valid_line("nul\0"));
    }
}
