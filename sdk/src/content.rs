use {
    chrono::{DateTime, NaiveDateTime, Utc},
    serde::{Deserialize, Serialize},
    snsync_protocol::{ItemReference, TIMESTAMP_FORMAT},
};

pub(crate) fn format_timestamp(time: DateTime<Utc>) -> String {
    time.format(TIMESTAMP_FORMAT).to_string()
}

pub(crate) fn parse_timestamp(input: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(input, TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Client-side metadata stored inside item content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppData {
    #[serde(rename = "org.standardnotes.sn", default)]
    pub org_standard_notes_sn: AppDataDetail,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppDataDetail {
    #[serde(default)]
    pub client_updated_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteContent {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub text: String,
    #[serde(rename = "references", default)]
    pub item_references: Vec<ItemReference>,
    #[serde(rename = "appData", default)]
    pub app_data: AppData,
}

impl NoteContent {
    /// Empty note content with the client-updated clock set to now.
    pub fn new() -> Self {
        let mut content = Self::default();
        content.app_data.org_standard_notes_sn.client_updated_at = format_timestamp(Utc::now());
        content
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagContent {
    #[serde(default)]
    pub title: String,
    #[serde(rename = "references", default)]
    pub item_references: Vec<ItemReference>,
    #[serde(rename = "appData", default)]
    pub app_data: AppData,
}

impl TagContent {
    /// Empty tag content with the client-updated clock set to now.
    pub fn new() -> Self {
        let mut content = Self::default();
        content.app_data.org_standard_notes_sn.client_updated_at = format_timestamp(Utc::now());
        content
    }
}

/// Content of an `SN|`-prefixed item (themes, components, server
/// extensions). No title, text or references; those accessors return
/// empty values by contract.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingContent {
    #[serde(default)]
    pub identifier: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub hosted_url: String,
    #[serde(rename = "appData", default)]
    pub app_data: AppData,
}

/// Decrypted payload of an item, one variant per content type.
///
/// The variants share a capability set (title, text, references, app-data
/// clock); accessors that a variant doesn't support return empty values
/// and the matching setters do nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    Note(NoteContent),
    Tag(TagContent),
    Setting(SettingContent),
}

impl Content {
    /// Parses a decrypted content JSON string into the variant selected by
    /// `content_type`.
    ///
    /// # Panics
    ///
    /// Panics on a content type this client has no model for; routing an
    /// unknown type here is a programming error, not recoverable data.
    pub fn from_json(content_type: &str, input: &str) -> serde_json::Result<Self> {
        match content_type {
            "Note" => Ok(Self::Note(serde_json::from_str(input)?)),
            "Tag" => Ok(Self::Tag(serde_json::from_str(input)?)),
            t if t.starts_with("SN|") => Ok(Self::Setting(serde_json::from_str(input)?)),
            other => panic!("no content model for content type `{other}`"),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        match self {
            Self::Note(content) => serde_json::to_string(content),
            Self::Tag(content) => serde_json::to_string(content),
            Self::Setting(content) => serde_json::to_string(content),
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Self::Note(content) => &content.title,
            Self::Tag(content) => &content.title,
            Self::Setting(_) => "",
        }
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        match self {
            Self::Note(content) => content.title = title.into(),
            Self::Tag(content) => content.title = title.into(),
            Self::Setting(_) => {}
        }
    }

    /// Tags and settings only have titles, so their text is empty.
    pub fn text(&self) -> &str {
        match self {
            Self::Note(content) => &content.text,
            Self::Tag(_) | Self::Setting(_) => "",
        }
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        if let Self::Note(content) = self {
            content.text = text.into();
        }
    }

    pub fn text_contains(&self, needle: &str) -> bool {
        match self {
            Self::Note(content) => content.text.contains(needle),
            Self::Tag(_) | Self::Setting(_) => false,
        }
    }

    pub fn references(&self) -> &[ItemReference] {
        match self {
            Self::Note(content) => &content.item_references,
            Self::Tag(content) => &content.item_references,
            Self::Setting(_) => &[],
        }
    }

    pub fn set_references(&mut self, references: Vec<ItemReference>) {
        match self {
            Self::Note(content) => content.item_references = references,
            Self::Tag(content) => content.item_references = references,
            Self::Setting(_) => {}
        }
    }

    /// Inserts references whose uuid is not already present, preserving
    /// existing ones.
    pub fn upsert_references(&mut self, references: Vec<ItemReference>) {
        let existing = match self {
            Self::Note(content) => &mut content.item_references,
            Self::Tag(content) => &mut content.item_references,
            Self::Setting(_) => return,
        };
        for reference in references {
            if !existing.iter().any(|r| r.uuid == reference.uuid) {
                existing.push(reference);
            }
        }
    }

    pub fn app_data(&self) -> &AppData {
        match self {
            Self::Note(content) => &content.app_data,
            Self::Tag(content) => &content.app_data,
            Self::Setting(content) => &content.app_data,
        }
    }

    pub fn set_app_data(&mut self, app_data: AppData) {
        match self {
            Self::Note(content) => content.app_data = app_data,
            Self::Tag(content) => content.app_data = app_data,
            Self::Setting(content) => content.app_data = app_data,
        }
    }

    /// The client-updated clock, if set and well-formed.
    pub fn update_time(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.app_data().org_standard_notes_sn.client_updated_at)
    }

    pub fn set_update_time(&mut self, time: DateTime<Utc>) {
        let detail = match self {
            Self::Note(content) => &mut content.app_data.org_standard_notes_sn,
            Self::Tag(content) => &mut content.app_data.org_standard_notes_sn,
            Self::Setting(content) => &mut content.app_data.org_standard_notes_sn,
        };
        detail.client_updated_at = format_timestamp(time);
    }
}
