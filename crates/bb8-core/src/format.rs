use bb8_common::{Segment, Template};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("command template expects {expected} values but {actual} were supplied")]
    Arity { expected: usize, actual: usize },
}

/// Substitutes `values` into the template's slots in order.
pub fn format_command(template: &Template, values: &[&str]) -> Result<String, FormatError> {
    let expected = template.placeholder_count();
    if expected != values.len() {
        return Err(FormatError::Arity {
            expected,
            actual: values.len(),
        });
    }

    let mut rendered = String::with_capacity(
        template.source().len() + values.iter().map(|v| v.len()).sum::<usize>(),
    );
    let mut values = values.iter();
    for segment in template.segments() {
        match segment {
            Segment::Literal(text) => rendered.push_str(text),
            Segment::Placeholder => {
                if let Some(value) = values.next() {
                    rendered.push_str(value);
                }
            }
        }
    }
    Ok(rendered)
}
