use crate::process::error::{ProcessError, ProcessResult};

/// Trait for parsing a line of output into a record
pub trait LineParser<T>: Send + Sync {
    /// Parse a line; `Ok(None)` skips it
    fn parse(&self, line: &str) -> ProcessResult<Option<T>>;
}

/// Parses a line holding a single floating-point number.
///
/// Blank lines are skipped. Anything else that is not a finite number is a
/// parse error.
#[derive(Debug, Clone, Copy, Default)]
pub struct FloatParser;

impl LineParser<f64> for FloatParser {
    fn parse(&self, line: &str) -> ProcessResult<Option<f64>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        match line.parse::<f64>() {
            Ok(value) if value.is_finite() => Ok(Some(value)),
            Ok(value) => Err(ProcessError::ParseError(format!("non-finite value {}", value))),
            Err(e) => Err(ProcessError::ParseError(format!("{:?}: {}", line, e))),
        }
    }
}

/// Parse the first record found in `output`
pub fn first_record<T, P: LineParser<T>>(output: &str, parser: &P) -> ProcessResult<T> {
    for line in output.lines() {
        if let Some(record) = parser.parse(line)? {
            return Ok(record);
        }
    }
    Err(ProcessError::NoOutput)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_parser() {
        assert_eq!(FloatParser.parse(" 21.50 ").unwrap(), Some(21.5));
        assert_eq!(FloatParser.parse("-3").unwrap(), Some(-3.0));
        assert_eq!(FloatParser.parse("").unwrap(), None);
        assert!(FloatParser.parse("Error 5: sensor not found").is_err());
        assert!(FloatParser.parse("inf").is_err());
    }

    #[test]
    fn test_first_record_skips_blank_lines() {
        assert_eq!(first_record("\n\n19.25\n20.00\n", &FloatParser).unwrap(), 19.25);
        assert!(matches!(first_record("\n  \n", &FloatParser), Err(ProcessError::NoOutput)));
        assert!(first_record("garbage\n19.25\n", &FloatParser).is_err());
    }
}
