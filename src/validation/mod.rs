//! Request validation pipeline.
//!
//! Rules are chained per field and every failing rule contributes a message,
//! so a request is rejected with the complete list of problems at once.
//! Sanitizers normalize values before they are stored.

/// Collects rule violations across all fields of a request.
#[derive(Debug, Default)]
pub struct Validator {
    violations: Vec<String>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a rule chain for a single field value.
    pub fn field<'v>(&'v mut self, value: &'v str) -> FieldRules<'v> {
        FieldRules {
            value,
            violations: &mut self.violations,
        }
    }

    /// Finish validation, returning every violation in rule order.
    pub fn finish(self) -> Result<(), Vec<String>> {
        if self.violations.is_empty() {
            Ok(())
        } else {
            Err(self.violations)
        }
    }
}

/// Rule chain for one field. Rules never short-circuit each other.
pub struct FieldRules<'v> {
    value: &'v str,
    violations: &'v mut Vec<String>,
}

impl FieldRules<'_> {
    fn check(self, ok: bool, message: &str) -> Self {
        if !ok {
            self.violations.push(message.to_string());
        }
        self
    }

    /// Value must contain something other than whitespace.
    pub fn required(self, message: &str) -> Self {
        let ok = !self.value.trim().is_empty();
        self.check(ok, message)
    }

    /// Value must be at least `min` characters long.
    pub fn min_len(self, min: usize, message: &str) -> Self {
        let ok = self.value.chars().count() >= min;
        self.check(ok, message)
    }

    pub fn contains_digit(self, message: &str) -> Self {
        let ok = self.value.chars().any(|c| c.is_ascii_digit());
        self.check(ok, message)
    }

    pub fn contains_uppercase(self, message: &str) -> Self {
        let ok = self.value.chars().any(|c| c.is_ascii_uppercase());
        self.check(ok, message)
    }

    /// Value must look like `local@domain.tld` once trimmed.
    pub fn email(self, message: &str) -> Self {
        let ok = is_email(self.value.trim());
        self.check(ok, message)
    }
}

fn is_email(value: &str) -> bool {
    if value.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2
        && labels.iter().all(|l| {
            !l.is_empty()
                && !l.starts_with('-')
                && !l.ends_with('-')
                && l.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
}

/// Trim and HTML-escape a free-text value before it is stored or relayed.
pub fn sanitize_text(value: &str) -> String {
    escape_html(value.trim())
}

/// Escape the characters that are significant in HTML.
pub fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            '/' => escaped.push_str("&#x2F;"),
            '\\' => escaped.push_str("&#x5C;"),
            '`' => escaped.push_str("&#96;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Canonical form of an email address: trimmed and lowercased.
pub fn normalize_email(value: &str) -> String {
    value.trim().to_lowercase()
}
