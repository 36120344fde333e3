//! Error reporting for user feedback.

use crate::core::error::{Error, ErrorCategory};

/// Format an error with full context for user display.
pub fn format_error_for_user(error: &Error) -> String {
    let mut output = String::new();

    output.push_str(&format!("Error: {}\n", error));
    output.push_str(&format!("Category: {}\n", error.category()));

    if let Some(suggestion) = error.suggestion() {
        output.push_str(&format!("\nSuggestion: {}\n", suggestion));
    }

    let mut source = std::error::Error::source(error);
    if source.is_some() {
        output.push_str("\nCaused by:\n");
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("  {}: {}\n", depth, err));
            source = err.source();
            depth += 1;
        }
    }

    output
}

/// Map errors to process exit codes.
pub fn error_to_exit_code(error: &Error) -> u8 {
    match error.category() {
        ErrorCategory::Io => 2,
        ErrorCategory::Configuration => 3,
        ErrorCategory::Evidence => 4,
        ErrorCategory::Reputation => 5,
        ErrorCategory::Concurrency => 6,
        ErrorCategory::Serialization => 7,
        ErrorCategory::Other => 1,
    }
}
