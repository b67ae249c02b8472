//! MIME layout tree of a post.
//!
//! The layout records how an article was structured on the wire so that
//! the generator can rebuild it: which parts exist, their declared types,
//! and which post object (inline text or attachment) each leaf carries.
//!
//! Stored form is compact JSON. A part that has nothing but a body
//! serializes as the bare body:
//!
//! ```text
//! 0
//! {"h": {"X-A": ["v"]}, "b": 0}
//! {"t": "multipart/mixed", "b": [{"t": "text/plain", "b": 0}, 1]}
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::model::headers::Headers;

/// Position of a post object: 0 is the inline message, 1..=N the N-th attachment.
pub type PostObjectIndex = u32;

/// Body of one layout node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum BodyObject {
    /// Nothing between the part headers and the next delimiter.
    #[default]
    Empty,
    /// A leaf backed by a post object.
    ObjectIndex(PostObjectIndex),
    /// A multipart container.
    Parts(Vec<PartInfo>),
}

/// One node of the layout tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartInfo {
    /// Declared content type. For leaves this is the full header value;
    /// for multipart containers the bare media type.
    pub content_type: Option<String>,
    /// Content was transfer-encoded as binary (base64 on the wire).
    pub binary: bool,
    /// Content contains NUL bytes. Unused when `binary`.
    pub has_null: bool,
    /// Content contains bytes above 0x7F. Unused when `binary` or `has_null`.
    pub has_8bit: bool,
    /// Extra part headers, without Content-Type and Content-Transfer-Encoding.
    pub headers: Headers,
    /// Multipart parameters to restore, boundary excluded.
    pub mp_params: BTreeMap<String, String>,
    pub body: BodyObject,
}

impl PartInfo {
    /// A part with only a body.
    pub fn with_body(body: BodyObject) -> Self {
        Self {
            body,
            ..Self::default()
        }
    }

    fn only_body(&self) -> bool {
        self.content_type.is_none()
            && !self.binary
            && !self.has_null
            && !self.has_8bit
            && self.headers.is_empty()
            && self.mp_params.is_empty()
    }
}

// ── Serialization ───────────────────────────────────────────────

impl Serialize for BodyObject {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            BodyObject::Empty => serializer.serialize_none(),
            BodyObject::ObjectIndex(i) => serializer.serialize_u32(*i),
            BodyObject::Parts(parts) => parts.serialize(serializer),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BodyRepr {
    Index(PostObjectIndex),
    Parts(Vec<PartInfo>),
}

impl<'de> Deserialize<'de> for BodyObject {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Option::<BodyRepr>::deserialize(deserializer)? {
            None => BodyObject::Empty,
            Some(BodyRepr::Index(i)) => BodyObject::ObjectIndex(i),
            Some(BodyRepr::Parts(parts)) => BodyObject::Parts(parts),
        })
    }
}

fn is_false(b: &bool) -> bool {
    !*b
}

#[derive(Serialize)]
struct PartRef<'a> {
    #[serde(rename = "t", skip_serializing_if = "Option::is_none")]
    content_type: &'a Option<String>,
    #[serde(rename = "x", skip_serializing_if = "is_false")]
    binary: bool,
    #[serde(rename = "0", skip_serializing_if = "is_false")]
    has_null: bool,
    #[serde(rename = "8", skip_serializing_if = "is_false")]
    has_8bit: bool,
    #[serde(rename = "h", skip_serializing_if = "Headers::is_empty")]
    headers: &'a Headers,
    #[serde(rename = "p", skip_serializing_if = "BTreeMap::is_empty")]
    mp_params: &'a BTreeMap<String, String>,
    #[serde(rename = "b")]
    body: &'a BodyObject,
}

#[derive(Deserialize)]
struct PartOwned {
    #[serde(rename = "t", default)]
    content_type: Option<String>,
    #[serde(rename = "x", default)]
    binary: bool,
    #[serde(rename = "0", default)]
    has_null: bool,
    #[serde(rename = "8", default)]
    has_8bit: bool,
    #[serde(rename = "h", default)]
    headers: Headers,
    #[serde(rename = "p", default)]
    mp_params: BTreeMap<String, String>,
    #[serde(rename = "b", default)]
    body: BodyObject,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PartRepr {
    // Bare must be tried first: a derived struct also accepts sequences.
    Bare(BodyObject),
    Full(PartOwned),
}

impl Serialize for PartInfo {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.only_body() {
            return self.body.serialize(serializer);
        }
        PartRef {
            content_type: &self.content_type,
            binary: self.binary,
            has_null: self.has_null,
            has_8bit: self.has_8bit,
            headers: &self.headers,
            mp_params: &self.mp_params,
            body: &self.body,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PartInfo {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match PartRepr::deserialize(deserializer)? {
            PartRepr::Full(p) => PartInfo {
                content_type: p.content_type,
                binary: p.binary,
                has_null: p.has_null,
                has_8bit: p.has_8bit,
                headers: p.headers,
                mp_params: p.mp_params,
                body: p.body,
            },
            PartRepr::Bare(body) => PartInfo::with_body(body),
        })
    }
}
