//! Predicate engine over decrypted items.
//!
//! A filter set is a conjunction (or, with `match_any`, a disjunction) of
//! typed predicates. Only filters matching an item's content type apply to
//! it; a filter with an empty key is a type-only filter that admits every
//! item of its type. Tag-membership predicates consult the tags present in
//! the filtered set itself.

use {crate::items::Item, regex::Regex, tracing::debug};

/// A set of predicates combined with AND (`match_any = false`) or OR.
#[derive(Debug, Clone, Default)]
pub struct ItemFilters {
    pub match_any: bool,
    pub filters: Vec<Filter>,
}

/// One predicate: `key <comparison> value`, applied to items of
/// `item_type`.
///
/// Comparisons are `==`, `!=`, `contains` and `~` (regex, unanchored
/// unless the pattern anchors itself). Note keys: `title`, `text`, `uuid`,
/// `deleted`, `tagtitle`, `taguuid`. Tag keys: `title`, `uuid`.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    pub item_type: String,
    pub key: String,
    pub comparison: String,
    pub value: String,
}

/// Applies the filter set, returning the items that survive. An empty
/// filter set leaves the input untouched.
pub fn filter_items(items: Vec<Item>, filters: &ItemFilters) -> Vec<Item> {
    if filters.filters.is_empty() {
        return items;
    }
    debug!(
        items = items.len(),
        filters = filters.filters.len(),
        match_any = filters.match_any,
        "filtering items",
    );

    let tags: Vec<Item> = items
        .iter()
        .filter(|item| item.content_type == "Tag")
        .cloned()
        .collect();

    items
        .into_iter()
        .filter(|item| match item.content_type.as_str() {
            "Note" => apply_filters(item, filters, &tags),
            "Tag" => apply_filters(item, filters, &[]),
            _ => false,
        })
        .collect()
}

/// Evaluates all predicates of the item's type. With `match_any`, the
/// first satisfied predicate wins; otherwise the result is the AND over
/// the applicable predicates, and an item with no applicable predicates is
/// excluded.
fn apply_filters(item: &Item, filters: &ItemFilters, tags: &[Item]) -> bool {
    let mut matched_all = false;
    for filter in filters
        .filters
        .iter()
        .filter(|f| f.item_type == item.content_type)
    {
        let matched = eval_predicate(filter, item, tags);
        if filters.match_any {
            if matched {
                return true;
            }
            matched_all = false;
        } else {
            if !matched {
                return false;
            }
            matched_all = true;
        }
    }
    matched_all
}

fn eval_predicate(filter: &Filter, item: &Item, tags: &[Item]) -> bool {
    match filter.key.to_lowercase().as_str() {
        "title" => compare(
            &filter.comparison,
            item.content.as_ref().map(|c| c.title()),
            &filter.value,
        ),
        "text" if item.content_type == "Note" => compare(
            &filter.comparison,
            item.content.as_ref().map(|c| c.text()),
            &filter.value,
        ),
        "uuid" => item.uuid == filter.value,
        "deleted" if item.content_type == "Note" => item.deleted == parse_bool(&filter.value),
        "tagtitle" if item.content_type == "Note" => tags.iter().any(|tag| {
            tag.content.as_ref().is_some_and(|content| {
                compare(&filter.comparison, Some(content.title()), &filter.value)
                    && references(tag, item)
            })
        }),
        "taguuid" if item.content_type == "Note" => {
            let tagged = tags
                .iter()
                .any(|tag| tag.uuid == filter.value && references(tag, item));
            match filter.comparison.as_str() {
                "==" => tagged,
                "!=" => !tagged,
                _ => false,
            }
        }
        // no criteria means the filter applies to the type only
        _ => true,
    }
}

/// Whether `tag` holds a reference to `item`.
fn references(tag: &Item, item: &Item) -> bool {
    tag.content
        .as_ref()
        .is_some_and(|content| content.references().iter().any(|r| r.uuid == item.uuid))
}

/// String comparison against a possibly-absent subject. Absent content
/// never matches. A regex that fails to compile is fatal to the match.
fn compare(comparison: &str, actual: Option<&str>, value: &str) -> bool {
    let Some(actual) = actual else {
        return false;
    };
    match comparison {
        "==" => actual == value,
        "!=" => actual != value,
        "contains" => actual.contains(value),
        "~" => Regex::new(value).is_ok_and(|re| re.is_match(actual)),
        _ => false,
    }
}

/// Accepts the spellings existing clients send for booleans; anything else
/// reads as false.
fn parse_bool(value: &str) -> bool {
    matches!(value, "1" | "t" | "T" | "true" | "TRUE" | "True")
}
