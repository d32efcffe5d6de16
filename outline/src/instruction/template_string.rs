use crate::instruction::value::Value;

/// Body of a backtick literal, split at its `${expr}` interpolations.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateString {
    pub parts: Vec<TemplateStringPart>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TemplateStringPart {
    Literal(String),
    /// Evaluated and printed in place.
    Expression(Value),
}

impl TemplateString {
    /// The joined text when no part needs evaluation, otherwise `self` back.
    pub fn into_text(self) -> Result<String, TemplateString> {
        if self
            .parts
            .iter()
            .any(|p| matches!(p, TemplateStringPart::Expression(_)))
        {
            return Err(self);
        }
        Ok(self
            .parts
            .into_iter()
            .filter_map(|p| match p {
                TemplateStringPart::Literal(s) => Some(s),
                TemplateStringPart::Expression(_) => None,
            })
            .collect())
    }
}
