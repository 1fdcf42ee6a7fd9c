//! `${name}` placeholders in request URLs.
//!
//! Templates are parsed and checked during plan validation so a typo in a
//! variable name never reaches a running virtual user.

use std::collections::BTreeMap;

use crate::error::TemplateError;

/// Runtime variable holding the 1-based virtual user id.
pub const VU_VARIABLE: &str = "__VU";
/// Runtime variable holding the 0-based iteration number of the virtual user.
pub const ITER_VARIABLE: &str = "__ITER";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Variable(String),
}

/// A parsed URL template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlTemplate {
    segments: Vec<Segment>,
}

/// Values available while rendering a template.
#[derive(Debug, Clone, Copy)]
pub struct Variables<'a> {
    pub plan: &'a BTreeMap<String, String>,
    pub vu: u64,
    pub iteration: u64,
}

impl UrlTemplate {
    pub fn parse(raw: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut rest = raw;
        let mut offset = 0;

        while let Some(start) = rest.find("${") {
            if start > 0 {
                segments.push(Segment::Literal(rest[..start].to_string()));
            }
            let after = &rest[start + 2..];
            let end = after
                .find('}')
                .ok_or(TemplateError::Unterminated(offset + start))?;
            let name = after[..end].trim();
            if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(TemplateError::InvalidName(after[..end].to_string()));
            }
            segments.push(Segment::Variable(name.to_string()));

            let consumed = start + 2 + end + 1;
            offset += consumed;
            rest = &rest[consumed..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }
        Ok(Self { segments })
    }

    /// Variable names referenced by this template, in order of appearance.
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Variable(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Fails on the first variable that is neither declared nor built in.
    pub fn check_variables(&self, declared: &BTreeMap<String, String>) -> Result<(), TemplateError> {
        match self
            .variables()
            .find(|v| *v != VU_VARIABLE && *v != ITER_VARIABLE && !declared.contains_key(*v))
        {
            Some(unknown) => Err(TemplateError::UnknownVariable(unknown.to_string())),
            None => Ok(()),
        }
    }

    /// Substitutes every placeholder. Unknown names render as empty strings;
    /// validation rules them out before a run starts.
    pub fn render(&self, vars: Variables<'_>) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Variable(name) if name == VU_VARIABLE => {
                    out.push_str(&vars.vu.to_string())
                }
                Segment::Variable(name) if name == ITER_VARIABLE => {
                    out.push_str(&vars.iteration.to_string())
                }
                Segment::Variable(name) => {
                    if let Some(value) = vars.plan.get(name) {
                        out.push_str(value);
                    }
                }
            }
        }
        out
    }
}

/// Resolves a rendered URL against the plan's base URL.
///
/// Absolute `http(s)://` URLs are used as-is. Anything else is appended to
/// the base URL with exactly one `/` between them, so a base of
/// `https://host/api/web` and a path of `/projects` keeps the `/api/web`
/// prefix.
pub fn resolve_url(base_url: Option<&str>, rendered: &str) -> String {
    if rendered.starts_with("http://") || rendered.starts_with("https://") {
        return rendered.to_string();
    }
    let Some(base) = base_url else {
        return rendered.to_string();
    };
    let base = base.trim_end_matches('/');
    let path = rendered.trim_start_matches('/');
    if path.is_empty() {
        base.to_string()
    } else {
        format!("{base}/{path}")
    }
}

/// Checks that a rendered and resolved URL parses.
pub fn check_url(url: &str) -> Result<url::Url, TemplateError> {
    url::Url::parse(url).map_err(|e| TemplateError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })
}
