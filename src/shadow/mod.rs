//! # Shadow Registry
//!
//! Device shadows are key/value tables mirrored between the device and the
//! cloud. The registry holds up to [`MAX_SHADOWS`] tables: at most one classic
//! (unnamed) shadow plus named ones. A table's shape is fixed at registration;
//! afterwards only values and flags change.
//!
//! Incoming deltas go through [`ShadowRegistry::apply_delta_document`], which
//! decodes each known key as its declared type, stores the new value and
//! invokes the table's [`ShadowHandler`]. Outgoing changes are marked with
//! [`ShadowRegistry::update`] and serialized into a
//! `{"state":{"desired":{..},"reported":{..}}}` document by
//! [`ShadowRegistry::render_pending`].

mod value;

use core::fmt;

use heapless::{String, Vec};
use serde::de::{DeserializeSeed, Deserializer, IgnoredAny, MapAccess, Visitor};
use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Serialize, Serializer};

use crate::error::ShadowError;
use crate::runtime::ShadowHandler;
use value::ValueSeed;

pub use value::{SHADOW_KEY_LEN, SHADOW_TEXT_LEN, ShadowElement, ShadowValue, UpdateKind, ValueKind};

/// Maximum number of elements in one shadow table.
pub const MAX_SHADOW_ELEMENTS: usize = 10;

/// Maximum number of registered shadow tables.
pub const MAX_SHADOWS: usize = 4;

/// Maximum length of a shadow name.
pub const SHADOW_NAME_LEN: usize = 32;

/// Index of the first registered table, conventionally the classic shadow.
pub const CLASSIC_SHADOW: usize = 0;

/// One registered shadow.
pub struct ShadowTable<'a> {
    name: Option<String<SHADOW_NAME_LEN>>,
    elements: Vec<ShadowElement, MAX_SHADOW_ELEMENTS>,
    handler: &'a dyn ShadowHandler,
}

impl ShadowTable<'_> {
    /// `None` for the classic shadow.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn elements(&self) -> &[ShadowElement] {
        &self.elements
    }

    pub fn element(&self, key: &str) -> Option<&ShadowElement> {
        self.elements.iter().find(|e| e.key() == key)
    }

    /// `true` if any element waits to be published.
    pub fn has_pending_publish(&self) -> bool {
        self.elements.iter().any(|e| e.needs_publish())
    }

    fn apply(&mut self, position: usize, value: ShadowValue) -> DeltaOutcome {
        let element = &mut self.elements[position];
        element.set_from_delta(value);
        self.handler.on_delta(position, element.key(), element.value());
        DeltaOutcome::Applied(position)
    }
}

/// A table description for [`ShadowRegistry::register_tables`].
pub struct ShadowTableConfig<'t, 'a> {
    pub name: Option<&'t str>,
    pub elements: &'t [ShadowElement],
    pub handler: &'a dyn ShadowHandler,
}

/// A key/value pair for an ad-hoc document update.
#[derive(Debug, Clone, PartialEq)]
pub struct ShadowField<'k> {
    pub key: &'k str,
    pub value: ShadowValue,
}

/// Where the desired values sit in an incoming shadow document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeltaSection {
    /// `state`, as in `update/delta` messages.
    State,
    /// `state.delta`, as in `get/accepted` replies.
    StateDelta,
}

/// Scratch space for unescaping strings while decoding a delta.
const UNESCAPE_LEN: usize = 128;

/// Result of applying one delta member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaOutcome {
    /// The element at this index was updated and its callback invoked.
    Applied(usize),
    /// The key is unknown or the value was `null`; nothing changed.
    Ignored,
}

/// Registered shadow tables, indexed in registration order.
pub struct ShadowRegistry<'a> {
    tables: Vec<ShadowTable<'a>, MAX_SHADOWS>,
    limit: usize,
}

impl<'a> Default for ShadowRegistry<'a> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> ShadowRegistry<'a> {
    pub fn new() -> Self {
        Self {
            tables: Vec::new(),
            limit: MAX_SHADOWS,
        }
    }

    /// Lowers the number of tables accepted by [`register`](Self::register).
    pub fn set_limit(&mut self, limit: usize) {
        self.limit = limit.min(MAX_SHADOWS);
    }

    /// Registers a table and returns its index.
    ///
    /// `name` is `None` for the classic shadow. Element values are copied in,
    /// so the caller's slice only needs to live for this call.
    pub fn register(
        &mut self,
        name: Option<&str>,
        elements: &[ShadowElement],
        handler: &'a dyn ShadowHandler,
    ) -> Result<usize, ShadowError> {
        if self.tables.len() >= self.limit {
            return Err(ShadowError::RegistryFull);
        }
        if elements.len() > MAX_SHADOW_ELEMENTS {
            return Err(ShadowError::TooManyElements(elements.len()));
        }
        if self.index_of(name).is_some() {
            return Err(match name {
                Some(_) => ShadowError::DuplicateName,
                None => ShadowError::DuplicateClassic,
            });
        }
        for (i, element) in elements.iter().enumerate() {
            if elements[..i].iter().any(|e| e.key() == element.key()) {
                return Err(ShadowError::DuplicateKey);
            }
        }

        let name = match name {
            Some(n) if n.is_empty() => return Err(ShadowError::NameTooLong),
            Some(n) => {
                let mut owned = String::new();
                owned.push_str(n).map_err(|_| ShadowError::NameTooLong)?;
                Some(owned)
            }
            None => None,
        };
        // Both bounds were checked above.
        let elements = Vec::from_slice(elements).map_err(|_| ShadowError::TooManyElements(elements.len()))?;
        self.tables
            .push(ShadowTable {
                name,
                elements,
                handler,
            })
            .map_err(|_| ShadowError::RegistryFull)?;

        let index = self.tables.len() - 1;
        debug!("registered shadow {} with {} elements", index, self.tables[index].elements.len());
        Ok(index)
    }

    /// Registers several tables. Each one succeeds or fails on its own; the
    /// first failure is returned after all were attempted.
    pub fn register_tables(&mut self, tables: &[ShadowTableConfig<'_, 'a>]) -> Result<(), ShadowError> {
        let mut first_error = None;
        for table in tables {
            if let Err(e) = self.register(table.name, table.elements, table.handler) {
                warn!("shadow registration failed: {:?}", e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn table(&self, index: usize) -> Option<&ShadowTable<'a>> {
        self.tables.get(index)
    }

    pub fn tables(&self) -> impl Iterator<Item = &ShadowTable<'a>> {
        self.tables.iter()
    }

    /// Finds a table by name (`None` for classic).
    pub fn index_of(&self, name: Option<&str>) -> Option<usize> {
        self.tables.iter().position(|t| t.name() == name)
    }

    fn table_mut(&mut self, index: usize) -> Result<&mut ShadowTable<'a>, ShadowError> {
        self.tables
            .get_mut(index)
            .ok_or(ShadowError::UnknownShadow(index))
    }

    /// Applies one desired value pushed by the cloud.
    ///
    /// Unknown keys are ignored without invoking the callback. Otherwise the
    /// value must match the element's declared type; it is stored and the
    /// callback runs exactly once.
    pub fn apply_delta(
        &mut self,
        index: usize,
        key: &str,
        value: ShadowValue,
    ) -> Result<DeltaOutcome, ShadowError> {
        let table = self.table_mut(index)?;
        let Some(position) = table.elements.iter().position(|e| e.key() == key) else {
            debug!("shadow {}: ignoring delta for unknown key {}", index, key);
            return Ok(DeltaOutcome::Ignored);
        };
        if table.elements[position].kind() != value.kind() {
            return Err(ShadowError::TypeMismatch);
        }
        Ok(table.apply(position, value))
    }

    /// Decodes a shadow document and applies every desired value in `section`.
    ///
    /// Members are applied in document order. Unknown keys and `null` values
    /// are skipped. A value of the wrong type makes the rest of the document
    /// unreadable; members before it stay applied. Returns the number of
    /// elements that changed, zero if the section is absent.
    pub fn apply_delta_document(
        &mut self,
        index: usize,
        doc: &[u8],
        section: DeltaSection,
    ) -> Result<usize, ShadowError> {
        let table = self.table_mut(index)?;
        let members = DeltaMembers { table, index };
        let mut scratch = [0u8; UNESCAPE_LEN];
        let mut de = serde_json_core::de::Deserializer::new(doc, Some(&mut scratch[..]));
        let applied = match section {
            DeltaSection::State => Member::new("state", members).deserialize(&mut de),
            DeltaSection::StateDelta => {
                Member::new("state", Member::new("delta", members)).deserialize(&mut de).map(Option::flatten)
            }
        };
        match applied {
            Ok(applied) => Ok(applied.unwrap_or(0)),
            Err(e) => {
                warn!("shadow {}: malformed delta document: {:?}", index, e);
                Err(ShadowError::MalformedDocument)
            }
        }
    }

    /// Sets a value from the device side and marks it for publishing.
    pub fn update(
        &mut self,
        index: usize,
        key: &str,
        value: ShadowValue,
        kind: UpdateKind,
    ) -> Result<(), ShadowError> {
        let table = self.table_mut(index)?;
        let element = table
            .elements
            .iter_mut()
            .find(|e| e.key() == key)
            .ok_or(ShadowError::UnknownKey)?;
        if element.kind() != value.kind() {
            return Err(ShadowError::TypeMismatch);
        }
        element.set_from_device(value, kind);
        Ok(())
    }

    /// Serializes every element waiting to be published into `out`.
    ///
    /// Returns the document length, or `None` when nothing is pending. Flags
    /// are not cleared; call [`mark_published`](Self::mark_published) once the
    /// document has been queued.
    pub fn render_pending(&self, index: usize, out: &mut [u8]) -> Result<Option<usize>, ShadowError> {
        let table = self
            .tables
            .get(index)
            .ok_or(ShadowError::UnknownShadow(index))?;
        if !table.has_pending_publish() {
            return Ok(None);
        }
        let entries = table
            .elements
            .iter()
            .filter(|e| e.needs_publish())
            .map(|e| (e.key(), e.value(), e.update_kind()));
        render_document(entries, out).map(Some)
    }

    /// Clears the publish flags of a table.
    pub fn mark_published(&mut self, index: usize) {
        if let Some(table) = self.tables.get_mut(index) {
            for element in table.elements.iter_mut() {
                element.clear_publish();
            }
        }
    }

    /// Serializes an arbitrary set of fields of a registered table into one
    /// document, without touching the stored elements.
    pub fn render_fields(
        &self,
        index: usize,
        fields: &[ShadowField<'_>],
        kind: UpdateKind,
        out: &mut [u8],
    ) -> Result<usize, ShadowError> {
        if index >= self.tables.len() {
            return Err(ShadowError::UnknownShadow(index));
        }
        let entries = fields.iter().map(move |f| (f.key, &f.value, kind));
        render_document(entries, out)
    }
}

fn render_document<'v, I>(entries: I, out: &mut [u8]) -> Result<usize, ShadowError>
where
    I: Iterator<Item = (&'v str, &'v ShadowValue, UpdateKind)> + Clone,
{
    serde_json_core::to_slice(&Document(entries), out).map_err(|_| ShadowError::DocumentTooLarge)
}

/// `{"state":{"desired":{..},"reported":{..}}}`
struct Document<I>(I);

struct State<I>(I);

/// The members of one section.
struct Section<I> {
    entries: I,
    wanted: fn(UpdateKind) -> bool,
}

impl<'v, I> Serialize for Document<I>
where
    I: Iterator<Item = (&'v str, &'v ShadowValue, UpdateKind)> + Clone,
{
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut doc = serializer.serialize_struct("Document", 1)?;
        doc.serialize_field("state", &State(self.0.clone()))?;
        doc.end()
    }
}

impl<'v, I> Serialize for State<I>
where
    I: Iterator<Item = (&'v str, &'v ShadowValue, UpdateKind)> + Clone,
{
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let sections: [(&'static str, fn(UpdateKind) -> bool); 2] = [
            ("desired", UpdateKind::includes_desired),
            ("reported", UpdateKind::includes_reported),
        ];
        let mut state = serializer.serialize_struct("State", sections.len())?;
        for (name, wanted) in sections {
            if self.0.clone().any(|(_, _, kind)| wanted(kind)) {
                state.serialize_field(name, &Section { entries: self.0.clone(), wanted })?;
            } else {
                state.skip_field(name)?;
            }
        }
        state.end()
    }
}

impl<'v, I> Serialize for Section<I>
where
    I: Iterator<Item = (&'v str, &'v ShadowValue, UpdateKind)> + Clone,
{
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        for (key, value, kind) in self.entries.clone() {
            if (self.wanted)(kind) {
                map.serialize_entry(key, value)?;
            }
        }
        map.end()
    }
}

/// Finds `key` in an object and hands its value to `inner`. Other members are
/// skipped.
struct Member<'k, S> {
    key: &'k str,
    inner: S,
}

impl<'k, S> Member<'k, S> {
    fn new(key: &'k str, inner: S) -> Self {
        Self { key, inner }
    }
}

impl<'de, S: DeserializeSeed<'de>> DeserializeSeed<'de> for Member<'_, S> {
    type Value = Option<S::Value>;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_map(self)
    }
}

impl<'de, S: DeserializeSeed<'de>> Visitor<'de> for Member<'_, S> {
    type Value = Option<S::Value>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "an object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut inner = Some(self.inner);
        let mut found = None;
        while let Some(key) = map.next_key::<&str>()? {
            match inner.take() {
                Some(seed) if key == self.key => found = Some(map.next_value_seed(seed)?),
                other => {
                    inner = other;
                    map.next_value::<IgnoredAny>()?;
                }
            }
        }
        Ok(found)
    }
}

/// Applies each member of a desired-state object to one table.
struct DeltaMembers<'r, 'a> {
    table: &'r mut ShadowTable<'a>,
    index: usize,
}

impl<'de> DeserializeSeed<'de> for DeltaMembers<'_, '_> {
    type Value = usize;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_map(self)
    }
}

impl<'de> Visitor<'de> for DeltaMembers<'_, '_> {
    type Value = usize;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a desired state object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut applied = 0;
        while let Some(key) = map.next_key::<&str>()? {
            let Some(position) = self.table.elements.iter().position(|e| e.key() == key) else {
                debug!("shadow {}: ignoring delta for unknown key {}", self.index, key);
                map.next_value::<IgnoredAny>()?;
                continue;
            };
            let kind = self.table.elements[position].kind();
            if let Some(value) = map.next_value_seed(ValueSeed(kind))? {
                self.table.apply(position, value);
                applied += 1;
            }
        }
        if applied > 0 {
            debug!("shadow {}: {} elements changed", self.index, applied);
        }
        Ok(applied)
    }
}
