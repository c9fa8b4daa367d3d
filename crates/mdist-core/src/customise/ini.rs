//! Reader and writer for the product's PHP-guarded INI config files.
//!
//! Only the subset those files use is understood: `[section]` headers,
//! `key = value` pairs, `key[] = value` arrays and `;` comments. Section and
//! key order is kept so a rewrite stays close to the input.

use std::fmt;

use thiserror::Error;

/// First line of every written file; keeps the web server from serving it.
pub const PHP_GUARD: &str = "; <?php exit; ?> DO NOT REMOVE THIS LINE";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("line {line}: {message}")]
pub struct IniParseError {
    pub line: usize,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IniValue {
    /// `key =` with nothing after it.
    Empty,
    Text(String),
    Integer(i64),
    Float(f64),
}

impl IniValue {
    fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() {
            return IniValue::Empty;
        }
        if let Some(inner) = unquote(raw) {
            return IniValue::Text(inner.to_string());
        }
        if let Ok(i) = raw.parse::<i64>() {
            return IniValue::Integer(i);
        }
        if let Ok(f) = raw.parse::<f64>() {
            if f.is_finite() {
                return IniValue::Float(f);
            }
        }
        IniValue::Text(raw.to_string())
    }

    /// Text form of the value, unquoted.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            IniValue::Text(s) => Some(s),
            _ => None,
        }
    }

    fn write(&self, f: &mut fmt::Formatter<'_>, key: &str) -> fmt::Result {
        match self {
            IniValue::Empty => writeln!(f, "{key} ="),
            IniValue::Text(s) if s.is_empty() => writeln!(f, "{key} ="),
            IniValue::Text(s) if s.starts_with(|c: char| c.is_ascii_digit()) => {
                writeln!(f, "{key} = \"{s}\"")
            }
            IniValue::Text(s) => writeln!(f, "{key} = {s}"),
            IniValue::Integer(i) => writeln!(f, "{key} = {i}"),
            IniValue::Float(v) if v.fract() == 0.0 => writeln!(f, "{key} = {v:.1}"),
            IniValue::Float(v) => writeln!(f, "{key} = {v}"),
        }
    }
}

impl From<&str> for IniValue {
    fn from(s: &str) -> Self {
        IniValue::Text(s.to_string())
    }
}

fn unquote(raw: &str) -> Option<&str> {
    let quote = raw.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    (raw.len() >= 2 && raw.ends_with(quote)).then(|| &raw[1..raw.len() - 1])
}

#[derive(Debug, Clone, PartialEq)]
pub enum IniEntry {
    Value(IniValue),
    Array(Vec<IniValue>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct IniSection {
    pub name: String,
    entries: Vec<(String, IniEntry)>,
}

impl IniSection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&IniEntry> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Values of the `key[]` array, if present.
    pub fn array(&self, key: &str) -> Option<&[IniValue]> {
        match self.get(key)? {
            IniEntry::Array(values) => Some(values),
            IniEntry::Value(_) => None,
        }
    }

    /// Insert or replace `key`, keeping its position when it already exists.
    pub fn set(&mut self, key: &str, entry: IniEntry) {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) => *existing = entry,
            None => self.entries.push((key.to_string(), entry)),
        }
    }

    fn push_array_value(&mut self, key: &str, value: IniValue) {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some((_, IniEntry::Array(values))) => values.push(value),
            Some((_, other)) => *other = IniEntry::Array(vec![value]),
            None => self.entries.push((key.to_string(), IniEntry::Array(vec![value]))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct IniDocument {
    sections: Vec<IniSection>,
}

impl IniDocument {
    pub fn parse(text: &str) -> Result<Self, IniParseError> {
        let mut doc = IniDocument::default();
        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with(';') {
                continue;
            }
            if let Some(rest) = line.strip_prefix('[') {
                let Some((name, tail)) = rest.split_once(']') else {
                    return Err(IniParseError {
                        line: index + 1,
                        message: "unterminated section header".into(),
                    });
                };
                let tail = tail.trim();
                if !tail.is_empty() && !tail.starts_with(';') {
                    return Err(IniParseError {
                        line: index + 1,
                        message: format!("unexpected text after section [{name}]"),
                    });
                }
                doc.sections.push(IniSection::new(name));
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                tracing::debug!("Ignoring INI line {}: {line}", index + 1);
                continue;
            };
            let Some(section) = doc.sections.last_mut() else {
                return Err(IniParseError {
                    line: index + 1,
                    message: "entry outside of any section".into(),
                });
            };
            let key = key.trim();
            let value = IniValue::parse(strip_comment(value));
            match key.strip_suffix("[]") {
                Some(array_key) => section.push_array_value(array_key, value),
                None => section.set(key, IniEntry::Value(value)),
            }
        }
        Ok(doc)
    }

    pub fn section(&self, name: &str) -> Option<&IniSection> {
        self.sections.iter().find(|s| s.name == name)
    }

    /// The named section, appended empty if missing.
    pub fn section_mut(&mut self, name: &str) -> &mut IniSection {
        let index = match self.sections.iter().position(|s| s.name == name) {
            Some(index) => index,
            None => {
                self.sections.push(IniSection::new(name));
                self.sections.len() - 1
            }
        };
        &mut self.sections[index]
    }

    pub fn sections(&self) -> impl Iterator<Item = &IniSection> {
        self.sections.iter()
    }
}

/// Cut a trailing `; comment`, leaving quoted text alone.
fn strip_comment(value: &str) -> &str {
    let value = value.trim_start();
    let mut quote = None;
    for (i, c) in value.char_indices() {
        match (quote, c) {
            (None, '"' | '\'') if i == 0 => quote = Some(c),
            (Some(q), c) if c == q => quote = None,
            (None, ';') => return &value[..i],
            _ => {}
        }
    }
    value
}

impl fmt::Display for IniDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{PHP_GUARD}")?;
        for section in &self.sections {
            writeln!(f)?;
            writeln!(f, "[{}]", section.name)?;
            for (key, entry) in &section.entries {
                match entry {
                    IniEntry::Value(value) => value.write(f, key)?,
                    IniEntry::Array(values) => {
                        let array_key = format!("{key}[]");
                        for value in values {
                            value.write(f, &array_key)?;
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read() {
        let doc = IniDocument::parse(
            r#"
; I'm a comment
[data] ; Comments here too
value="Tea pot"
value2  =  Electric Boogaloo
scalar=42
floating=4.2
empty     = ''
missing = ; With comment
quoted = "a;b" ; trailing
[arrays]
array[] = 10
array[] = 'coffee'
array[] =
array[] = Plugins
"#,
        )
        .unwrap();

        let data = doc.section("data").unwrap();
        assert_eq!(data.get("value"), Some(&IniEntry::Value("Tea pot".into())));
        assert_eq!(data.get("value2"), Some(&IniEntry::Value("Electric Boogaloo".into())));
        assert_eq!(data.get("scalar"), Some(&IniEntry::Value(IniValue::Integer(42))));
        assert_eq!(data.get("floating"), Some(&IniEntry::Value(IniValue::Float(4.2))));
        assert_eq!(data.get("empty"), Some(&IniEntry::Value("".into())));
        assert_eq!(data.get("missing"), Some(&IniEntry::Value(IniValue::Empty)));
        assert_eq!(data.get("quoted"), Some(&IniEntry::Value("a;b".into())));

        assert_eq!(
            doc.section("arrays").unwrap().array("array").unwrap(),
            &[
                IniValue::Integer(10),
                "coffee".into(),
                IniValue::Empty,
                "Plugins".into()
            ]
        );
    }

    #[test]
    fn test_write() {
        let mut doc = IniDocument::default();
        let data = doc.section_mut("data");
        data.set("tea", IniEntry::Value("coffee".into()));
        data.set("coffee", IniEntry::Value(IniValue::Integer(7)));
        data.set("mpg", IniEntry::Value("over 9000".into()));
        data.set("fruit", IniEntry::Value("10 oranges".into()));
        data.set("ratio", IniEntry::Value(IniValue::Float(2.0)));
        data.set("nothing", IniEntry::Value(IniValue::Empty));
        doc.section_mut("arrays").set(
            "array",
            IniEntry::Array(vec![IniValue::Integer(10), "tepid".into()]),
        );

        let expected = r#"; <?php exit; ?> DO NOT REMOVE THIS LINE

[data]
tea = coffee
coffee = 7
mpg = over 9000
fruit = "10 oranges"
ratio = 2.0
nothing =

[arrays]
array[] = 10
array[] = tepid
"#;
        assert_eq!(doc.to_string(), expected);
    }

    #[test]
    fn test_rewrite_is_stable() {
        let text = "[General]\nenable = 1\nname = \"3rd party\"\n\n[Plugins]\nPlugins[] = CorePluginsAdmin\nPlugins[] = Goals\n";
        let once = IniDocument::parse(text).unwrap().to_string();
        let twice = IniDocument::parse(&once).unwrap().to_string();
        assert_eq!(once, twice);
        assert!(once.starts_with(PHP_GUARD));
    }

    #[test]
    fn test_entry_outside_section() {
        let err = IniDocument::parse("key = value\n").unwrap_err();
        assert_eq!(err.line, 1);
    }
}
