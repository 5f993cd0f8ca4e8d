//! Input validation utilities
//!
//! Provides validation and sanitization for untrusted path strings.

/// Longest path string accepted from a caller.
pub const MAX_PATH_INPUT_LENGTH: usize = 4096;

/// Validate that a caller-supplied path string is safe to interpret.
///
/// Empty input is valid (it names the storage root).
pub fn is_valid_path_input(input: &str) -> bool {
    input.len() <= MAX_PATH_INPUT_LENGTH
        && !input.contains('\0')
        && !input.contains('\r')
        && !input.contains('\n')
}

/// Sanitize user input
pub fn sanitize_input(input: &str) -> String {
    input.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_inputs() {
        assert!(is_valid_path_input(""));
        assert!(is_valid_path_input("docs/report.pdf"));
        assert!(is_valid_path_input("..\\windows\\style"));
    }

    #[test]
    fn test_control_characters_rejected() {
        assert!(!is_valid_path_input("evil\0.txt"));
        assert!(!is_valid_path_input("line\nbreak"));
        assert!(!is_valid_path_input("carriage\rreturn"));
    }

    #[test]
    fn test_overlong_input_rejected() {
        let long = "a".repeat(MAX_PATH_INPUT_LENGTH + 1);
        assert!(!is_valid_path_input(&long));
    }

    #[test]
    fn test_sanitize_trims() {
        assert_eq!(sanitize_input("  new folder \n"), "new folder");
    }
}
