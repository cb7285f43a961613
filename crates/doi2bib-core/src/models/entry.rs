/// How a field value was delimited in the source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Delimiter {
    #[default]
    Braces,
    Quotes,
    /// Numbers, undefined macro names and concatenations that use them.
    Bare,
}

/// A single `name = value` pair of a BibTeX entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub value: String,
    pub delimiter: Delimiter,
}

impl Field {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            delimiter: Delimiter::Braces,
        }
    }

    pub fn with_delimiter(mut self, delimiter: Delimiter) -> Self {
        self.delimiter = delimiter;
        self
    }
}

/// A bibliographic record: entry type, citation key and ordered fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub entry_type: String,
    pub key: String,
    pub fields: Vec<Field>,
}

impl Entry {
    pub fn new(entry_type: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            entry_type: entry_type.into(),
            key: key.into(),
            fields: Vec::new(),
        }
    }

    /// Builder-style field insertion, mostly useful in tests.
    pub fn with_field(mut self, name: &str, value: &str) -> Self {
        self.set(name, value);
        self
    }

    /// Case-insensitive field lookup.
    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields
            .iter()
            .find(|field| field.name.eq_ignore_ascii_case(name))
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Field> {
        self.fields
            .iter_mut()
            .find(|field| field.name.eq_ignore_ascii_case(name))
    }

    /// Value of a field, if present.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.get(name).map(|field| field.value.as_str())
    }

    /// Value of a field, if present and not blank.
    pub fn non_empty(&self, name: &str) -> Option<&str> {
        self.value(name).map(str::trim).filter(|v| !v.is_empty())
    }

    /// Set a field, replacing an existing one of the same (case-insensitive) name.
    pub fn set(&mut self, name: &str, value: &str) {
        match self.get_mut(name) {
            Some(field) => field.value = value.to_string(),
            None => self.fields.push(Field::new(name, value)),
        }
    }

    pub fn remove_field(&mut self, name: &str) -> Option<Field> {
        let idx = self
            .fields
            .iter()
            .position(|field| field.name.eq_ignore_ascii_case(name))?;
        Some(self.fields.remove(idx))
    }

    pub fn is_article(&self) -> bool {
        self.entry_type.eq_ignore_ascii_case("article")
    }
}
