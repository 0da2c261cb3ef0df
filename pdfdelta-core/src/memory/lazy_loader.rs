//! Lazy object store
//!
//! Objects are parsed from the byte source the first time they are asked
//! for. Each reference owns a single-initialisation slot: the first caller
//! performs the load and publishes it, concurrent callers for the same
//! reference block until it is published, and every caller afterwards gets
//! the same `Arc`.

use super::cache::{CacheStats, ContainerCache};
use super::memory_mapped::ByteSource;
use super::MemoryOptions;
use crate::objects::{Dictionary, Object, ObjectId, Resolve, Stream};
use crate::parser::filters::{self, decode, filters_from_dict, Decryption};
use crate::parser::object_stream::ObjectStream;
use crate::parser::objects::ObjectParser;
use crate::parser::{ParseOptions, ParseResult, SecurityHandler, XRefEntry, XRefTable};
use std::borrow::Cow;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, RwLock};
use tracing::{debug, trace, warn};

type Slot = Arc<OnceLock<Option<Arc<Object>>>>;

thread_local! {
    // (store address, reference) pairs being loaded on this thread
    static RESOLVING: RefCell<HashSet<(usize, ObjectId)>> = RefCell::new(HashSet::new());
}

struct ResolvingGuard {
    key: (usize, ObjectId),
}

impl ResolvingGuard {
    fn enter(key: (usize, ObjectId)) -> Option<Self> {
        RESOLVING
            .with(|set| set.borrow_mut().insert(key))
            .then_some(Self { key })
    }
}

impl Drop for ResolvingGuard {
    fn drop(&mut self) {
        RESOLVING.with(|set| {
            set.borrow_mut().remove(&self.key);
        });
    }
}

struct SecurityContext {
    handler: Arc<dyn SecurityHandler>,
    /// The `Encrypt` dictionary is stored in the clear.
    exempt: Option<ObjectId>,
}

/// Counters for tests and diagnostics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreStats {
    /// Loads performed (one per reference at most)
    pub loads: usize,
    /// References with a published slot
    pub resolved: usize,
    pub containers: CacheStats,
}

/// Concurrent map from reference to lazily loaded value.
pub struct ObjectStore {
    source: ByteSource,
    xref: XRefTable,
    parse_options: ParseOptions,
    memory_options: MemoryOptions,
    slots: RwLock<HashMap<ObjectId, Slot>>,
    containers: ContainerCache,
    security: OnceLock<SecurityContext>,
    missing: Arc<Object>,
    loads: AtomicUsize,
}

impl ObjectStore {
    pub fn new(
        source: ByteSource,
        xref: XRefTable,
        parse_options: ParseOptions,
        memory_options: MemoryOptions,
    ) -> Self {
        let containers = ContainerCache::new(memory_options.object_stream_cache_size);
        Self {
            source,
            xref,
            parse_options,
            memory_options,
            slots: RwLock::new(HashMap::new()),
            containers,
            security: OnceLock::new(),
            missing: Arc::new(Object::Null),
            loads: AtomicUsize::new(0),
        }
    }

    pub fn source(&self) -> &ByteSource {
        &self.source
    }

    pub fn data(&self) -> &[u8] {
        self.source.as_bytes()
    }

    pub fn xref(&self) -> &XRefTable {
        &self.xref
    }

    pub fn parse_options(&self) -> &ParseOptions {
        &self.parse_options
    }

    pub fn memory_options(&self) -> &MemoryOptions {
        &self.memory_options
    }

    /// Install the security handler. Objects loaded afterwards are decrypted,
    /// except `exempt` (the `Encrypt` dictionary). Returns false if a handler
    /// was already installed.
    pub fn set_security(&self, handler: Arc<dyn SecurityHandler>, exempt: Option<ObjectId>) -> bool {
        self.security
            .set(SecurityContext { handler, exempt })
            .is_ok()
    }

    pub fn security_handler(&self) -> Option<&Arc<dyn SecurityHandler>> {
        self.security.get().map(|ctx| &ctx.handler)
    }

    /// The sentinel returned for dangling references.
    pub fn missing(&self) -> Arc<Object> {
        self.missing.clone()
    }

    pub fn is_missing(&self, object: &Arc<Object>) -> bool {
        Arc::ptr_eq(object, &self.missing)
    }

    /// Resolve `id`, following reference-to-reference chains. Dangling
    /// references, cycles and over-long chains give the missing sentinel.
    pub fn resolve(&self, id: ObjectId) -> Arc<Object> {
        let mut current = id;
        let mut visited = Vec::new();

        for _ in 0..=self.parse_options.max_reference_chain {
            let Some(object) = self.lookup(current) else {
                debug!("Dangling reference {}", current);
                return self.missing();
            };
            match object.as_ref() {
                Object::Reference(next) => {
                    visited.push(current);
                    if visited.contains(next) {
                        warn!("Reference cycle through {} while resolving {}", next, id);
                        return self.missing();
                    }
                    current = *next;
                }
                _ => return object,
            }
        }

        warn!("Reference chain from {} exceeds {} hops", id, self.parse_options.max_reference_chain);
        self.missing()
    }

    /// The value stored for `id` itself, without following chains.
    pub fn lookup(&self, id: ObjectId) -> Option<Arc<Object>> {
        let slot = self.slot(id);
        if let Some(published) = slot.get() {
            return published.clone();
        }

        let key = (self as *const Self as usize, id);
        let Some(_guard) = ResolvingGuard::enter(key) else {
            warn!("Circular reference while loading {}", id);
            return None;
        };
        slot.get_or_init(|| self.load(id)).clone()
    }

    /// True once `id` has been loaded (or found missing).
    pub fn is_loaded(&self, id: ObjectId) -> bool {
        self.slots
            .read()
            .map(|slots| slots.get(&id).is_some_and(|slot| slot.get().is_some()))
            .unwrap_or(false)
    }

    fn slot(&self, id: ObjectId) -> Slot {
        if let Ok(slots) = self.slots.read() {
            if let Some(slot) = slots.get(&id) {
                return slot.clone();
            }
        }
        match self.slots.write() {
            Ok(mut slots) => slots.entry(id).or_default().clone(),
            // A poisoned map still yields a working, uncached slot
            Err(_) => Slot::default(),
        }
    }

    fn load(&self, id: ObjectId) -> Option<Arc<Object>> {
        self.loads.fetch_add(1, Ordering::Relaxed);

        let Some(entry) = self.xref.get(id.number()).copied() else {
            debug!("No xref entry for {}", id);
            return None;
        };

        let object = match entry {
            XRefEntry::Used { offset, generation } => {
                if generation != id.generation() {
                    debug!("{} requested, xref holds generation {}", id, generation);
                    return None;
                }
                self.load_at(id, offset)?
            }
            XRefEntry::Compressed { container, index } => {
                if id.generation() != 0 {
                    return None;
                }
                self.load_compressed(id, container, index)?
            }
            XRefEntry::Free { .. } => {
                trace!("{} is free", id);
                return None;
            }
        };

        trace!("Loaded {}", id);
        Some(Arc::new(object))
    }

    fn load_at(&self, id: ObjectId, offset: u64) -> Option<Object> {
        let data = self.data();
        let position = usize::try_from(offset).ok().filter(|&p| p < data.len());
        let Some(position) = position else {
            warn!("Offset {} of {} is outside the file", offset, id);
            return None;
        };

        let resolve_length = |length_id: ObjectId| self.resolve(length_id).as_integer();
        let parsed = ObjectParser::at(data, position, &self.parse_options).parse_indirect(&resolve_length);
        let (found, mut object) = match parsed {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!("Failed to parse {} at offset {}: {}", id, offset, err);
                return None;
            }
        };
        if found.number() != id.number() {
            warn!("Expected {} at offset {}, found {}", id, offset, found);
            return None;
        }

        if let Some(ctx) = self.security.get() {
            if ctx.exempt != Some(id) {
                if let Err(err) = decrypt_in_place(ctx.handler.as_ref(), id, &mut object) {
                    warn!("Failed to decrypt {}: {}", id, err);
                    return None;
                }
            }
        }

        Some(object)
    }

    fn load_compressed(&self, id: ObjectId, container: u32, index: u32) -> Option<Object> {
        let stream = match self.containers.get(container) {
            Some(stream) => stream,
            None => {
                let container_id = ObjectId::new(container, 0);
                let object = self.lookup(container_id)?;
                let Object::Stream(stream) = object.as_ref() else {
                    warn!("Container {} of {} is a {}", container_id, id, object.type_name());
                    return None;
                };
                let decoded = match self.decode_stream(stream) {
                    Ok(decoded) => decoded,
                    Err(err) => {
                        warn!("Failed to decode object stream {}: {}", container_id, err);
                        return None;
                    }
                };
                let parsed = Arc::new(ObjectStream::new(
                    container_id,
                    stream.dictionary(),
                    decoded,
                    &self.parse_options,
                ));
                self.containers.put(container, parsed.clone());
                parsed
            }
        };

        let object = stream.get_object(id.number(), index as usize);
        if object.is_none() {
            debug!("{} not found in object stream {}", id, container);
        }
        object
    }

    /// Decoded bytes of `stream`, through the filter pipeline. Referenced
    /// `Filter`/`DecodeParms` entries are resolved first.
    pub fn decode_stream(&self, stream: &Stream) -> ParseResult<Arc<Vec<u8>>> {
        if let Some(cached) = stream.cached_decoded() {
            return Ok(cached);
        }

        let dict = self.direct_filter_entries(stream.dictionary());
        let (filters, params) = filters_from_dict(&dict);
        let decoded = decode(stream.raw_data(), &filters, &params, None)?;

        Ok(if self.memory_options.cache_decoded_streams {
            stream.store_decoded(decoded)
        } else {
            Arc::new(decoded)
        })
    }

    fn direct_filter_entries<'d>(&self, dict: &'d Dictionary) -> Cow<'d, Dictionary> {
        const KEYS: [&str; 4] = ["Filter", "DecodeParms", "F", "DP"];
        let indirect = |object: &Object| match object {
            Object::Reference(_) => true,
            Object::Array(items) => items.iter().any(|item| matches!(item, Object::Reference(_))),
            _ => false,
        };
        if !KEYS.iter().any(|key| dict.get(key).is_some_and(indirect)) {
            return Cow::Borrowed(dict);
        }

        let mut direct = dict.clone();
        for key in KEYS {
            let Some(value) = direct.get(key).cloned() else {
                continue;
            };
            let resolved = match value {
                Object::Reference(id) => (*self.resolve(id)).clone(),
                Object::Array(items) => Object::Array(
                    items
                        .into_iter()
                        .map(|item| match item {
                            Object::Reference(id) => (*self.resolve(id)).clone(),
                            other => other,
                        })
                        .collect(),
                ),
                other => other,
            };
            direct.set(key, resolved);
        }
        Cow::Owned(direct)
    }

    /// In-use references of the index.
    pub fn ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.xref.in_use_ids()
    }

    /// Drop every decoded container. They are rebuilt on demand.
    pub fn clear_containers(&self) {
        self.containers.clear();
    }

    pub fn stats(&self) -> StoreStats {
        let resolved = self
            .slots
            .read()
            .map(|slots| slots.values().filter(|slot| slot.get().is_some()).count())
            .unwrap_or(0);
        StoreStats {
            loads: self.loads.load(Ordering::Relaxed),
            resolved,
            containers: self.containers.stats(),
        }
    }
}

impl Resolve for ObjectStore {
    fn resolve(&self, id: ObjectId) -> Arc<Object> {
        ObjectStore::resolve(self, id)
    }
}

/// Decrypt the strings and stream body of one loaded object in place.
/// Cross-reference streams are stored in the clear.
fn decrypt_in_place(handler: &dyn SecurityHandler, id: ObjectId, object: &mut Object) -> ParseResult<()> {
    match object {
        Object::String(string) if handler.encrypts_strings() => {
            string.bytes = filters::decrypt(&string.bytes, Decryption { handler, id })?;
            string.encrypted = true;
        }
        Object::Array(items) => {
            for item in items {
                decrypt_in_place(handler, id, item)?;
            }
        }
        Object::Dictionary(dict) => decrypt_dict(handler, id, dict)?,
        Object::Stream(stream) => {
            if stream.dictionary().is_type("XRef") {
                return Ok(());
            }
            decrypt_dict(handler, id, stream.dictionary_mut())?;
            if handler.encrypts_streams() {
                let plain = filters::decrypt(stream.raw_data(), Decryption { handler, id })?;
                stream.set_raw_data(plain);
            }
        }
        _ => {}
    }
    Ok(())
}

fn decrypt_dict(handler: &dyn SecurityHandler, id: ObjectId, dict: &mut Dictionary) -> ParseResult<()> {
    let keys: Vec<String> = dict.keys().cloned().collect();
    for key in keys {
        if let Some(value) = dict.get_mut(&key) {
            decrypt_in_place(handler, id, value)?;
        }
    }
    Ok(())
}
