use {
    crate::{
        content::{format_timestamp, parse_timestamp, Content, NoteContent, TagContent},
        crypto::{decrypt_string, encrypt_string, generate_item_key, split_item_key},
        error::{Error, Result},
    },
    chrono::Utc,
    snsync_protocol::{EncryptedItem, ItemReference},
    std::collections::HashSet,
    tracing::debug,
    uuid::Uuid,
    zeroize::Zeroize,
};

/// A decrypted, parsed item. `content` is absent on deleted items.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Item {
    pub uuid: String,
    pub content: Option<Content>,
    pub content_type: String,
    pub deleted: bool,
    pub created_at: String,
    pub updated_at: String,
    /// Title length plus text length, filled in during parsing.
    pub content_size: usize,
}

impl Item {
    /// Typeless item with a fresh uuid and identical created/updated
    /// timestamps.
    pub fn new(content_type: impl Into<String>) -> Self {
        let now = format_timestamp(Utc::now());
        Self {
            uuid: Uuid::new_v4().to_string(),
            content: None,
            content_type: content_type.into(),
            deleted: false,
            created_at: now.clone(),
            updated_at: now,
            content_size: 0,
        }
    }

    /// New note item with empty content.
    pub fn new_note() -> Self {
        let mut item = Self::new("Note");
        item.content = Some(Content::Note(NoteContent::new()));
        item
    }

    /// New tag item with empty content.
    pub fn new_tag() -> Self {
        let mut item = Self::new("Tag");
        item.content = Some(Content::Tag(TagContent::new()));
        item
    }

    /// Marks the item for server-side deletion: content is cleared and the
    /// tombstone is submitted on the next put.
    pub fn mark_deleted(&mut self) {
        self.deleted = true;
        self.content = None;
        self.content_size = 0;
    }
}

/// A decrypted item whose content is still a JSON string.
#[derive(Debug, Clone, Default)]
pub struct DecryptedItem {
    pub uuid: String,
    pub content: String,
    pub content_type: String,
    pub deleted: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Envelopes a batch of items for submission.
///
/// Each item gets a fresh random key; the content is encrypted under the
/// key's halves and the key itself under (`mk`, `ak`), both bound to the
/// item uuid.
pub fn encrypt_items(items: &[Item], mk: &str, ak: &str) -> Result<Vec<EncryptedItem>> {
    debug!(items = items.len(), "encrypting items");
    items.iter().map(|item| encrypt_item(item, mk, ak)).collect()
}

fn encrypt_item(item: &Item, mk: &str, ak: &str) -> Result<EncryptedItem> {
    let mut item_key = generate_item_key();
    let (item_enc_key, item_auth_key) = split_item_key(&item_key);

    let content_json = match &item.content {
        Some(content) => content.to_json()?,
        None => "null".to_owned(),
    };
    let content = encrypt_string(&content_json, item_enc_key, item_auth_key, &item.uuid, None)?;
    let enc_item_key = encrypt_string(&item_key, mk, ak, &item.uuid, None)?;
    item_key.zeroize();

    Ok(EncryptedItem {
        uuid: item.uuid.clone(),
        content,
        content_type: item.content_type.clone(),
        enc_item_key,
        deleted: item.deleted,
        created_at: item.created_at.clone(),
        updated_at: item.updated_at.clone(),
    })
}

/// Opens a batch of envelopes with the session keys.
///
/// Envelopes with an empty `enc_item_key` (deleted tombstones) pass
/// through with empty content. Any decryption failure is fatal to the
/// batch; items are never silently dropped.
pub fn decrypt_items(items: &[EncryptedItem], mk: &str, ak: &str) -> Result<Vec<DecryptedItem>> {
    debug!(items = items.len(), "decrypting items");
    let mut decrypted = Vec::with_capacity(items.len());
    for item in items {
        let content = if item.enc_item_key.is_empty() {
            String::new()
        } else {
            let mut item_key = decrypt_string(&item.enc_item_key, mk, ak, &item.uuid)?;
            let (item_enc_key, item_auth_key) = split_item_key(&item_key);
            let content = decrypt_string(&item.content, item_enc_key, item_auth_key, &item.uuid)?;
            item_key.zeroize();
            content
        };
        decrypted.push(DecryptedItem {
            uuid: item.uuid.clone(),
            content,
            content_type: item.content_type.clone(),
            deleted: item.deleted,
            created_at: item.created_at.clone(),
            updated_at: item.updated_at.clone(),
        });
    }
    Ok(decrypted)
}

/// Parses decrypted content JSON into typed items and computes content
/// sizes. Timestamps are validated against the wire format.
pub fn parse_items(items: &[DecryptedItem]) -> Result<Vec<Item>> {
    let mut parsed = Vec::with_capacity(items.len());
    for item in items {
        let content = if item.deleted {
            None
        } else {
            Some(Content::from_json(&item.content_type, &item.content)?)
        };
        for (field, value) in [("created_at", &item.created_at), ("updated_at", &item.updated_at)] {
            if parse_timestamp(value).is_none() {
                return Err(Error::MalformedEnvelope(format!(
                    "bad {field} timestamp `{value}` on item \"{}\"",
                    item.uuid,
                )));
            }
        }
        let content_size = content
            .as_ref()
            .map(|c| c.title().len() + c.text().len())
            .unwrap_or_default();
        parsed.push(Item {
            uuid: item.uuid.clone(),
            content,
            content_type: item.content_type.clone(),
            deleted: item.deleted,
            created_at: item.created_at.clone(),
            updated_at: item.updated_at.clone(),
            content_size,
        });
    }
    Ok(parsed)
}

/// Decrypts and parses in one step.
pub fn decrypt_and_parse(items: &[EncryptedItem], mk: &str, ak: &str) -> Result<Vec<Item>> {
    parse_items(&decrypt_items(items, mk, ak)?)
}

/// Checks the rules a note or tag must satisfy before it can be created:
/// a title, a client-updated time, and a created-at date. Deleted items
/// and other content types are exempt.
pub fn validate_items(items: &[Item]) -> Result<()> {
    for item in items {
        if item.deleted || !matches!(item.content_type.as_str(), "Note" | "Tag") {
            continue;
        }
        let invalid = |reason: String| Error::InvalidItem {
            content_type: item.content_type.clone(),
            reason,
        };
        let title = item.content.as_ref().map(Content::title).unwrap_or_default();
        if title.is_empty() {
            return Err(invalid(format!("missing title: \"{}\"", item.uuid)));
        }
        if item
            .content
            .as_ref()
            .and_then(Content::update_time)
            .is_none()
        {
            return Err(invalid(format!("missing content updated time: \"{title}\"")));
        }
        if item.created_at.is_empty() {
            return Err(invalid(format!("missing created at date: \"{title}\"")));
        }
    }
    Ok(())
}

/// Drops items whose uuid was already seen, keeping the first occurrence.
/// Retrieved lists may contain duplicates due to upstream replication
/// quirks.
pub fn dedupe_encrypted_items(items: &mut Vec<EncryptedItem>) {
    let mut encountered = HashSet::new();
    items.retain(|item| encountered.insert(item.uuid.clone()));
}

/// Same first-wins de-dup over decrypted items.
pub fn dedupe_items(items: &mut Vec<Item>) {
    let mut encountered = HashSet::new();
    items.retain(|item| encountered.insert(item.uuid.clone()));
}

/// Makes every item in `items` reference every item in `to_ref`,
/// skipping references that already exist. Typically used to point tags
/// at notes.
pub fn update_item_refs(mut items: Vec<Item>, to_ref: &[Item]) -> Vec<Item> {
    let references: Vec<ItemReference> = to_ref
        .iter()
        .map(|target| ItemReference {
            uuid: target.uuid.clone(),
            content_type: target.content_type.clone(),
        })
        .collect();
    for item in &mut items {
        if let Some(content) = &mut item.content {
            content.upsert_references(references.clone());
        }
    }
    items
}

#[cfg(test)]
mod tests {
    use {super::*, crate::content::SettingContent};

    fn test_keys() -> (String, String) {
        let key = generate_item_key();
        let (mk, ak) = split_item_key(&key);
        (mk.to_owned(), ak.to_owned())
    }

    fn note(title: &str, text: &str) -> Item {
        let mut item = Item::new_note();
        if let Some(content) = &mut item.content {
            content.set_title(title);
            content.set_text(text);
        }
        item
    }

    #[test]
    fn encrypt_decrypt_parse_roundtrip() {
        let (mk, ak) = test_keys();
        let mut tag = Item::new_tag();
        if let Some(content) = &mut tag.content {
            content.set_title("Animal Facts");
        }
        let items = update_item_refs(vec![tag], &[note("Dogs", "Can't look up")]);

        let encrypted = encrypt_items(&items, &mk, &ak).unwrap();
        assert_eq!(encrypted.len(), 1);
        assert_eq!(encrypted[0].uuid, items[0].uuid);
        assert_eq!(encrypted[0].content.split(':').count(), 5);
        assert_eq!(encrypted[0].enc_item_key.split(':').count(), 5);

        let roundtripped = decrypt_and_parse(&encrypted, &mk, &ak).unwrap();
        assert_eq!(roundtripped.len(), 1);
        assert_eq!(roundtripped[0].uuid, items[0].uuid);
        let content = roundtripped[0].content.as_ref().unwrap();
        assert_eq!(content.title(), "Animal Facts");
        assert_eq!(content.references().len(), 1);
        assert_eq!(roundtripped[0].content_size, "Animal Facts".len());
    }

    #[test]
    fn wrong_session_keys_fail_the_batch() {
        let (mk, ak) = test_keys();
        let (other_mk, other_ak) = test_keys();
        let encrypted = encrypt_items(&[note("a", "b")], &mk, &ak).unwrap();
        assert!(matches!(
            decrypt_and_parse(&encrypted, &other_mk, &other_ak),
            Err(Error::AuthFailure),
        ));
    }

    #[test]
    fn deleted_items_skip_decryption() {
        let tombstone = EncryptedItem {
            uuid: "023112fe-9066-481e-8a63-f15f27d3f904".into(),
            content_type: "Note".into(),
            deleted: true,
            created_at: "2016-12-16T17:13:20.000Z".into(),
            updated_at: "2016-12-16T17:13:20.000Z".into(),
            ..EncryptedItem::default()
        };
        let (mk, ak) = test_keys();
        let items = decrypt_and_parse(&[tombstone], &mk, &ak).unwrap();
        assert_eq!(items.len(), 1);
        assert!(items[0].deleted);
        assert!(items[0].content.is_none());
        assert_eq!(items[0].content_size, 0);
    }

    #[test]
    fn setting_content_size_counts_nothing() {
        let (mk, ak) = test_keys();
        let mut item = Item::new("SN|Component");
        item.content = Some(Content::Setting(SettingContent {
            identifier: "org.example.widget".into(),
            name: "Widget".into(),
            hosted_url: "https://example.org".into(),
            ..SettingContent::default()
        }));
        let encrypted = encrypt_items(&[item], &mk, &ak).unwrap();
        let parsed = decrypt_and_parse(&encrypted, &mk, &ak).unwrap();
        assert_eq!(parsed[0].content_size, 0);
    }

    #[test]
    fn validation_rules() {
        // missing title
        let item = Item::new_note();
        match validate_items(&[item]) {
            Err(Error::InvalidItem { reason, .. }) => assert!(reason.contains("missing title")),
            other => panic!("expected InvalidItem, got {other:?}"),
        }

        // missing client-updated time
        let mut item = note("Dogs", "");
        item.content
            .as_mut()
            .unwrap()
            .set_app_data(Default::default());
        match validate_items(&[item]) {
            Err(Error::InvalidItem { reason, .. }) => {
                assert!(reason.contains("missing content updated time"));
            }
            other => panic!("expected InvalidItem, got {other:?}"),
        }

        // missing created-at
        let mut item = note("Dogs", "");
        item.created_at.clear();
        match validate_items(&[item]) {
            Err(Error::InvalidItem { reason, .. }) => {
                assert!(reason.contains("missing created at date"));
            }
            other => panic!("expected InvalidItem, got {other:?}"),
        }

        // deleted items are exempt
        let mut item = Item::new_note();
        item.mark_deleted();
        validate_items(&[item]).unwrap();

        // complete items pass
        validate_items(&[note("Dogs", "Can't look up"), Item::new_tag()]).unwrap_err();
        let mut tag = Item::new_tag();
        tag.content.as_mut().unwrap().set_title("Facts");
        validate_items(&[note("Dogs", "Can't look up"), tag]).unwrap();
    }

    #[test]
    fn dedupe_keeps_first_occurrence() {
        let a = note("a", "");
        let b = note("b", "");
        let mut duplicate = note("a-again", "");
        duplicate.uuid = a.uuid.clone();
        let mut items = vec![a.clone(), b.clone(), duplicate];
        dedupe_items(&mut items);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].content.as_ref().unwrap().title(), "a");
        assert_eq!(items[1].uuid, b.uuid);

        // idempotent
        let before = items.clone();
        dedupe_items(&mut items);
        assert_eq!(items, before);
    }

    #[test]
    fn dedupe_encrypted_preserves_order() {
        let make = |uuid: &str| EncryptedItem {
            uuid: uuid.into(),
            content_type: "Note".into(),
            ..EncryptedItem::default()
        };
        let mut items = vec![make("1"), make("2"), make("1"), make("3"), make("2")];
        dedupe_encrypted_items(&mut items);
        let uuids: Vec<&str> = items.iter().map(|i| i.uuid.as_str()).collect();
        assert_eq!(uuids, ["1", "2", "3"]);
    }
}
