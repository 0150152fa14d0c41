use thiserror::Error;

/// A parsed `cmdFmt` string: literal text interleaved with positional slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Placeholder,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("unsupported verb '%{verb}' at byte {offset}")]
    UnsupportedVerb { verb: char, offset: usize },
    #[error("dangling '%' at end of template")]
    DanglingPercent,
}

impl Template {
    /// Accepts `%s` and `%v` as slots and `%%` as a literal percent sign.
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = source.char_indices();
        while let Some((offset, ch)) = chars.next() {
            if ch != '%' {
                literal.push(ch);
                continue;
            }
            match chars.next() {
                Some((_, '%')) => literal.push('%'),
                Some((_, 's' | 'v')) => {
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Placeholder);
                }
                Some((_, verb)) => return Err(TemplateError::UnsupportedVerb { verb, offset }),
                None => return Err(TemplateError::DanglingPercent),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn placeholder_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|segment| matches!(segment, Segment::Placeholder))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_literals_and_slots() {
        let template = Template::parse("tail -n %s %v").expect("parse");
        assert_eq!(template.placeholder_count(), 2);
        assert_eq!(
            template.segments(),
            &[
                Segment::Literal("tail -n ".to_string()),
                Segment::Placeholder,
                Segment::Literal(" ".to_string()),
                Segment::Placeholder,
            ]
        );
    }

    #[test]
    fn escaped_percent_is_literal() {
        let template = Template::parse("df -h | grep 100%%").expect("parse");
        assert_eq!(template.placeholder_count(), 0);
        assert_eq!(
            template.segments(),
            &[Segment::Literal("df -h | grep 100%".to_string())]
        );
    }

    #[test]
    fn rejects_unknown_verbs() {
        assert_eq!(
            Template::parse("echo %d").unwrap_err(),
            TemplateError::UnsupportedVerb {
                verb: 'd',
                offset: 5
            }
        );
        assert_eq!(
            Template::parse("echo %").unwrap_err(),
            TemplateError::DanglingPercent
        );
    }
}
