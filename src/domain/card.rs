use serde_json::Value;

const MAX_TAG_LENGTH: usize = 49;

/// A single card of the NYPL collection, as listed in the metadata file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardMetadata {
    pub uuid: String,
    pub image_id: String,
    pub title: String,
}

impl TryFrom<&Value> for CardMetadata {
    type Error = String;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        let object = value
            .as_object()
            .ok_or_else(|| "A capture entry is not a JSON object.".to_string())?;
        let field = |name: &str| -> Result<String, String> {
            match object.get(name) {
                Some(Value::String(s)) => Ok(s.clone()),
                Some(Value::Null) | None => Err(format!("The capture entry has no `{name}`.")),
                Some(other) => Ok(other.to_string()),
            }
        };

        Ok(Self {
            uuid: field("uuid")?,
            image_id: field("imageID")?,
            title: field("title")?,
        })
    }
}

/// Turns a card title into a value the provider accepts as a tag: word
/// characters and `-` only, no runs of `_`, at most 49 characters.
pub fn clean_tag_value(value: &str) -> String {
    let mut cleaned = String::with_capacity(value.len());
    for c in value.chars() {
        let c = if c.is_alphanumeric() || c == '_' || c == '-' {
            c
        } else {
            '_'
        };
        if c == '_' && cleaned.ends_with('_') {
            continue;
        }
        cleaned.push(c);
    }
    cleaned.chars().take(MAX_TAG_LENGTH).collect()
}
