//! Key codec: maps edges onto index keys and rows back onto edges
//!
//! Every key is the raw value prefixed with a fixed-length role tag:
//!
//! | attribute | tag     | derived from |
//! |-----------|---------|--------------|
//! | `pk`      | `NODE#` | `from`       |
//! | `sk`      | `EDGE#` | `to`         |
//! | `rk`      | `EDGE#` | `to`         |
//! | `ak`      | `AREA#` | `area`       |
//!
//! The tags keep values of different roles from colliding inside the same
//! index. All functions here are pure.

use crate::error::{EdgeStoreError, EdgeStoreResult};
use crate::graph::{Area, Edge, Node, Score};
use crate::kv::{AttributeValue, Item, PrimaryKey};
use std::time::Duration;

/// Partition key attribute
pub const PK_ATTR: &str = "pk";
/// Sort key attribute
pub const SK_ATTR: &str = "sk";
/// Reverse index key attribute
pub const RK_ATTR: &str = "rk";
/// Area index key attribute
pub const AK_ATTR: &str = "ak";
/// Score attribute
pub const SCORE_ATTR: &str = "score";
/// Absolute expiry attribute (epoch seconds)
pub const TTL_ATTR: &str = "ttl";

/// Length in bytes of every role tag
pub const TAG_LEN: usize = 5;

/// Role of an encoded key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTag {
    /// Source role, used for partition keys
    Node,
    /// Target role, used for sort and reverse index keys
    Edge,
    /// Area index keys
    Area,
}

impl KeyTag {
    pub fn prefix(&self) -> &'static str {
        match self {
            KeyTag::Node => "NODE#",
            KeyTag::Edge => "EDGE#",
            KeyTag::Area => "AREA#",
        }
    }

    pub fn encode(&self, raw: &str) -> String {
        let prefix = self.prefix();
        let mut key = String::with_capacity(prefix.len() + raw.len());
        key.push_str(prefix);
        key.push_str(raw);
        key
    }
}

/// Partition key of every out-edge of `node`
pub fn encode_primary(node: &Node) -> String {
    KeyTag::Node.encode(node.as_str())
}

/// Sort key / reverse index key of every in-edge of `node`
pub fn encode_reverse(node: &Node) -> String {
    KeyTag::Edge.encode(node.as_str())
}

/// Area index key
pub fn encode_area(area: &Area) -> String {
    KeyTag::Area.encode(area.as_str())
}

/// Strip the fixed-length tag from a raw key
///
/// Keys shorter than the tag decode to the empty value.
pub fn decode(raw: &str) -> &str {
    raw.get(TAG_LEN..).unwrap_or("")
}

pub fn decode_node(raw: &str) -> Node {
    Node::new(decode(raw))
}

pub fn decode_area(raw: &str) -> Area {
    Area::new(decode(raw))
}

/// Primary key of the `(from, to)` identity
pub fn edge_key(from: &Node, to: &Node) -> PrimaryKey {
    PrimaryKey::new(encode_primary(from), encode_reverse(to))
}

/// Absolute expiry for an edge written at `now` (epoch seconds)
pub fn expiry_of(edge: &Edge, now: i64) -> i64 {
    let ttl = i64::try_from(edge.ttl.as_secs()).unwrap_or(i64::MAX);
    now.saturating_add(ttl)
}

/// Row layout of an edge expiring at `expires_at`
pub fn edge_to_item(edge: &Edge, expires_at: i64) -> Item {
    let mut item = Item::new();
    item.insert(PK_ATTR.to_string(), encode_primary(&edge.from).into());
    item.insert(SK_ATTR.to_string(), encode_reverse(&edge.to).into());
    item.insert(RK_ATTR.to_string(), encode_reverse(&edge.to).into());
    item.insert(AK_ATTR.to_string(), encode_area(&edge.area).into());
    item.insert(SCORE_ATTR.to_string(), edge.score.as_f64().into());
    item.insert(TTL_ATTR.to_string(), expires_at.into());
    item
}

/// An edge as read back from the store, with its absolute expiry
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEdge {
    pub from: Node,
    pub to: Node,
    pub score: Score,
    pub area: Area,
    /// Epoch seconds after which the row may be reaped
    pub expires_at: i64,
}

impl StoredEdge {
    /// Convert into an edge whose TTL is the time remaining at `now`
    pub fn into_edge(self, now: i64) -> Edge {
        let remaining = u64::try_from(self.expires_at.saturating_sub(now)).unwrap_or(0);
        Edge {
            from: self.from,
            to: self.to,
            score: self.score,
            area: self.area,
            ttl: Duration::from_secs(remaining),
        }
    }

    /// Lazy expiry: an expired row may still be returned until reaped
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at < now
    }
}

fn string_attr<'a>(item: &'a Item, attribute: &'static str) -> EdgeStoreResult<&'a str> {
    match item.get(attribute) {
        Some(value) => value.as_str().ok_or_else(|| EdgeStoreError::Decode {
            attribute,
            reason: format!("expected a string, got {:?}", value),
        }),
        None => Err(EdgeStoreError::Decode {
            attribute,
            reason: "missing".to_string(),
        }),
    }
}

fn number_attr<'a>(item: &'a Item, attribute: &'static str) -> EdgeStoreResult<&'a AttributeValue> {
    item.get(attribute).ok_or_else(|| EdgeStoreError::Decode {
        attribute,
        reason: "missing".to_string(),
    })
}

/// Decode a stored row; any missing or mistyped attribute fails the row
pub fn item_to_stored_edge(item: &Item) -> EdgeStoreResult<StoredEdge> {
    let pk = string_attr(item, PK_ATTR)?;
    let sk = string_attr(item, SK_ATTR)?;
    let ak = string_attr(item, AK_ATTR)?;

    let score = number_attr(item, SCORE_ATTR)?;
    let score = score.as_f64().ok_or_else(|| EdgeStoreError::Decode {
        attribute: SCORE_ATTR,
        reason: format!("expected a number, got {:?}", score),
    })?;

    let ttl = number_attr(item, TTL_ATTR)?;
    let expires_at = match ttl {
        AttributeValue::Int(secs) => *secs,
        AttributeValue::Num(secs) if secs.is_finite() => *secs as i64,
        other => {
            return Err(EdgeStoreError::Decode {
                attribute: TTL_ATTR,
                reason: format!("expected epoch seconds, got {:?}", other),
            })
        }
    };

    Ok(StoredEdge {
        from: decode_node(pk),
        to: decode_node(sk),
        score: Score::new(score),
        area: decode_area(ak),
        expires_at,
    })
}

/// Primary key of a row, as projected by a keys-only query
pub fn item_key(item: &Item) -> EdgeStoreResult<PrimaryKey> {
    Ok(PrimaryKey::new(
        string_attr(item, PK_ATTR)?,
        string_attr(item, SK_ATTR)?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let node = Node::new("order-42");
        let area = Area::new("Area1");

        assert_eq!(decode_node(&encode_primary(&node)), node);
        assert_eq!(decode_node(&encode_reverse(&node)), node);
        assert_eq!(decode_area(&encode_area(&area)), area);
    }

    #[test]
    fn test_tags_are_distinct_and_fixed_length() {
        let tags = [KeyTag::Node, KeyTag::Edge, KeyTag::Area];
        for tag in tags {
            assert_eq!(tag.prefix().len(), TAG_LEN);
        }
        assert_ne!(encode_primary(&Node::new("x")), encode_reverse(&Node::new("x")));
        assert_ne!(encode_reverse(&Node::new("x")), encode_area(&Area::new("x")));
    }

    #[test]
    fn test_short_key_decodes_to_empty() {
        assert_eq!(decode(""), "");
        assert_eq!(decode("NOD"), "");
        assert_eq!(decode("NODE#"), "");
    }

    #[test]
    fn test_non_ascii_values() {
        let node = Node::new("узел-1");
        assert_eq!(decode_node(&encode_primary(&node)), node);
        // Tag boundary falls inside a multi-byte char
        assert_eq!(decode("ééé"), "");
    }

    #[test]
    fn test_edge_item_layout() {
        let edge = Edge::new("A", "B").with_area("Area1").with_score(10.0);
        let item = edge_to_item(&edge, 1_000);

        assert_eq!(item[PK_ATTR].as_str(), Some("NODE#A"));
        assert_eq!(item[SK_ATTR].as_str(), Some("EDGE#B"));
        assert_eq!(item[RK_ATTR].as_str(), Some("EDGE#B"));
        assert_eq!(item[AK_ATTR].as_str(), Some("AREA#Area1"));
        assert_eq!(item[SCORE_ATTR].as_f64(), Some(10.0));
        assert_eq!(item[TTL_ATTR].as_i64(), Some(1_000));
        assert_eq!(edge_key(&edge.from, &edge.to), item_key(&item).unwrap());
    }

    #[test]
    fn test_item_decodes_back_to_edge() {
        let edge = Edge::new("A", "B")
            .with_area("Area1")
            .with_score(2.5)
            .with_ttl(Duration::from_secs(60));
        let now = 1_700_000_000;
        let stored = item_to_stored_edge(&edge_to_item(&edge, expiry_of(&edge, now))).unwrap();

        assert_eq!(stored.expires_at, now + 60);
        assert!(!stored.is_expired(now));
        assert_eq!(stored.clone().into_edge(now), edge);
        assert_eq!(stored.into_edge(now + 100).ttl, Duration::ZERO);
    }

    #[test]
    fn test_missing_attribute_fails() {
        let mut item = edge_to_item(&Edge::new("A", "B"), 0);
        item.remove(AK_ATTR);

        let err = item_to_stored_edge(&item).unwrap_err();
        assert!(matches!(err, EdgeStoreError::Decode { attribute: AK_ATTR, .. }));
    }

    #[test]
    fn test_mistyped_attribute_fails() {
        let mut item = edge_to_item(&Edge::new("A", "B"), 0);
        item.insert(SCORE_ATTR.to_string(), "high".into());

        let err = item_to_stored_edge(&item).unwrap_err();
        assert!(matches!(err, EdgeStoreError::Decode { attribute: SCORE_ATTR, .. }));
    }

    #[test]
    fn test_huge_ttl_saturates() {
        let edge = Edge::new("A", "B").with_ttl(Duration::from_secs(u64::MAX));
        assert_eq!(expiry_of(&edge, 10), i64::MAX);
    }
}
