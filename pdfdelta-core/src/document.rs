//! Loaded documents
//!
//! A [`Document`] owns the object store of one loaded revision and the
//! change tracker that records edits on top of it. Opening builds the
//! cross-reference index, checks it against the bytes and falls back once
//! to a linear scan when it cannot be trusted. Saving appends an
//! incremental update holding only the recorded changes.
//!
//! # Example
//!
//! ```rust,no_run
//! use pdfdelta::objects::Object;
//! use pdfdelta::{Document, DocumentOptions};
//!
//! # fn main() -> pdfdelta::Result<()> {
//! let document = Document::open_file("input.pdf", DocumentOptions::default())?;
//! println!("{} pages", document.page_count()?);
//!
//! let shapes = document.interpret_page(0)?;
//! println!("first page draws {} shapes", shapes.len());
//!
//! let note = document.create_object(Object::Integer(42));
//! println!("created {}", note);
//! document.append_to_file("input.pdf")?;
//! # Ok(())
//! # }
//! ```

mod changes;

pub use changes::{ChangeKind, ChangeRecord, ChangeTracker};

use crate::error::{PdfError, Result};
use crate::graphics::ShapeList;
use crate::interpreter::{CancellationToken, ContentSource, Interpreter, InterpreterOptions};
use crate::memory::{lock_sources, ByteSource, MemoryOptions, ObjectStore};
use crate::objects::{Object, ObjectId, Resolve, Stream};
use crate::parser::header::{PdfHeader, PdfVersion};
use crate::parser::page_tree::{PageTree, ParsedPage};
use crate::parser::{ParseError, ParseOptions, SecurityProvider, Trailer, XRefTable};
use crate::recovery::recover_xref;
use crate::writer;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// Everything configurable about a document, passed in at open time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentOptions {
    pub parse: ParseOptions,
    pub memory: MemoryOptions,
    pub interpreter: InterpreterOptions,
}

impl DocumentOptions {
    pub fn with_parse(mut self, parse: ParseOptions) -> Self {
        self.parse = parse;
        self
    }

    pub fn with_memory(mut self, memory: MemoryOptions) -> Self {
        self.memory = memory;
        self
    }

    pub fn with_interpreter(mut self, interpreter: InterpreterOptions) -> Self {
        self.interpreter = interpreter;
        self
    }
}

/// One loaded revision plus the changes recorded against it.
pub struct Document {
    store: ObjectStore,
    header: Option<PdfHeader>,
    recovered: bool,
    options: DocumentOptions,
    changes: ChangeTracker,
    pages: RwLock<Option<Arc<PageTree>>>,
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("version", &self.version())
            .field("bytes", &self.store.data().len())
            .field("recovered", &self.recovered)
            .field("changes", &self.changes.len())
            .finish()
    }
}

impl Document {
    /// Open with default options.
    pub fn open(source: impl Into<ByteSource>) -> Result<Self> {
        Self::open_with_options(source, DocumentOptions::default())
    }

    pub fn open_with_options(source: impl Into<ByteSource>, options: DocumentOptions) -> Result<Self> {
        Self::load(source.into(), options, None)
    }

    /// Open a file, mapping it when it is large enough.
    pub fn open_file<P: AsRef<Path>>(path: P, options: DocumentOptions) -> Result<Self> {
        let source = ByteSource::open(path, &options.memory)?;
        Self::load(source, options, None)
    }

    /// Open an encrypted document. `provider` builds the handler from the
    /// trailer's `Encrypt` dictionary.
    pub fn open_with_security(
        source: impl Into<ByteSource>,
        options: DocumentOptions,
        provider: &dyn SecurityProvider,
    ) -> Result<Self> {
        Self::load(source.into(), options, Some(provider))
    }

    fn load(
        source: ByteSource,
        options: DocumentOptions,
        security: Option<&dyn SecurityProvider>,
    ) -> Result<Self> {
        let header = match PdfHeader::parse(source.as_bytes()) {
            Ok(header) => Some(header),
            Err(err) => {
                warn!("{}, continuing without a version", err);
                None
            }
        };

        let (store, recovered) = match Self::index(&source, &options, security) {
            Ok(store) => (store, false),
            Err(err) if options.parse.allow_recovery && !err.is_security() => {
                warn!("Cross-reference index unusable ({}), rebuilding by linear scan", err);
                (Self::rebuild(source, &options, security, header.is_some())?, true)
            }
            Err(err) => return Err(err),
        };

        let changes = ChangeTracker::new(store.xref().size());
        info!(
            "Opened document: {} objects, recovered: {}",
            store.xref().len(),
            recovered
        );
        Ok(Self {
            store,
            header,
            recovered,
            options,
            changes,
            pages: RwLock::new(None),
        })
    }

    /// The store over the parsed and validated index.
    fn index(
        source: &ByteSource,
        options: &DocumentOptions,
        security: Option<&dyn SecurityProvider>,
    ) -> Result<ObjectStore> {
        let table = XRefTable::parse(source.as_bytes(), &options.parse)?;
        table.validate(source.as_bytes())?;
        let store = ObjectStore::new(source.clone(), table, options.parse.clone(), options.memory.clone());
        install_security(&store, security)?;
        if !has_catalog(&store) {
            return Err(PdfError::MissingRoot);
        }
        Ok(store)
    }

    /// The store over an index rebuilt by scanning every object header.
    fn rebuild(
        source: ByteSource,
        options: &DocumentOptions,
        security: Option<&dyn SecurityProvider>,
        has_header: bool,
    ) -> Result<ObjectStore> {
        let missing_root = || {
            if has_header {
                PdfError::MissingRoot
            } else {
                PdfError::Parse(ParseError::InvalidHeader)
            }
        };

        let (table, stats) = match recover_xref(source.as_bytes(), &options.parse) {
            Ok(recovered) => recovered,
            Err(err) => {
                warn!("Linear scan failed: {}", err);
                return Err(missing_root());
            }
        };
        debug!(
            "Rebuilt index: {} objects, {} trailers",
            stats.objects_found, stats.trailers_found
        );

        let store = ObjectStore::new(source, table, options.parse.clone(), options.memory.clone());
        install_security(&store, security)?;
        if !has_catalog(&store) {
            return Err(missing_root());
        }
        Ok(store)
    }

    pub fn version(&self) -> Option<PdfVersion> {
        self.header.as_ref().map(|h| h.version)
    }

    /// True when the index was rebuilt by the linear scan.
    pub fn is_recovered(&self) -> bool {
        self.recovered
    }

    pub fn options(&self) -> &DocumentOptions {
        &self.options
    }

    pub fn store(&self) -> &ObjectStore {
        &self.store
    }

    pub fn xref(&self) -> &XRefTable {
        self.store.xref()
    }

    pub fn trailer(&self) -> &Trailer {
        self.store.xref().trailer()
    }

    /// Bytes of the loaded revision.
    pub fn data(&self) -> &[u8] {
        self.store.data()
    }

    pub fn changes(&self) -> &ChangeTracker {
        &self.changes
    }

    /// In-use entries of the loaded index.
    pub fn object_count(&self) -> usize {
        self.store.ids().count()
    }

    pub fn root(&self) -> Result<ObjectId> {
        Ok(self.trailer().root()?)
    }

    pub fn catalog(&self) -> Result<Arc<Object>> {
        let catalog = self.resolve(self.root()?);
        if catalog.as_dict().is_none() {
            return Err(PdfError::MissingRoot);
        }
        Ok(catalog)
    }

    /// Resolve `id` through recorded changes first, then the store.
    /// Deleted and dangling references give the missing sentinel.
    pub fn resolve(&self, id: ObjectId) -> Arc<Object> {
        if self.changes.is_empty() {
            return self.store.resolve(id);
        }

        let mut current = id;
        let mut visited = Vec::new();
        for _ in 0..=self.options.parse.max_reference_chain {
            let object = match self.changes.get(current) {
                Some(record) if record.is_delete() => return self.store.missing(),
                Some(record) => record.value,
                None => match self.store.lookup(current) {
                    Some(object) => object,
                    None => return self.store.missing(),
                },
            };
            match object.as_ref() {
                Object::Reference(next) => {
                    visited.push(current);
                    if visited.contains(next) {
                        warn!("Reference cycle through {} while resolving {}", next, id);
                        return self.store.missing();
                    }
                    current = *next;
                }
                _ => return object,
            }
        }
        warn!("Reference chain from {} is too long", id);
        self.store.missing()
    }

    pub fn is_missing(&self, object: &Arc<Object>) -> bool {
        self.store.is_missing(object)
    }

    /// Decoded bytes of `stream` through the filter pipeline.
    pub fn decode_stream(&self, stream: &Stream) -> Result<Arc<Vec<u8>>> {
        Ok(self.store.decode_stream(stream)?)
    }

    pub fn set_object(&self, id: ObjectId, value: Object) {
        self.changes.record(id, value, ChangeKind::Change);
        self.invalidate_pages();
    }

    /// Record a change made on the user's behalf. Synthetic changes alone do
    /// not make [`has_user_changes`](Self::has_user_changes) true.
    pub fn set_synthetic(&self, id: ObjectId, value: Object) {
        self.changes.record(id, value, ChangeKind::Synthetic);
        self.invalidate_pages();
    }

    /// Store `value` under a fresh reference.
    pub fn create_object(&self, value: Object) -> ObjectId {
        let id = self.changes.next_reference();
        self.changes.record(id, value, ChangeKind::Change);
        id
    }

    pub fn delete_object(&self, id: ObjectId) {
        self.changes.record(id, Object::Null, ChangeKind::Delete);
        self.invalidate_pages();
    }

    pub fn has_user_changes(&self) -> bool {
        self.changes.has_user_changes()
    }

    fn invalidate_pages(&self) {
        match self.pages.write() {
            Ok(mut pages) => *pages = None,
            Err(poisoned) => *poisoned.into_inner() = None,
        }
    }

    fn page_tree(&self) -> Result<Arc<PageTree>> {
        if let Ok(pages) = self.pages.read() {
            if let Some(tree) = pages.as_ref() {
                return Ok(tree.clone());
            }
        }

        let catalog = self.catalog()?;
        let pages_id = catalog
            .as_dict()
            .and_then(|c| c.get_reference("Pages"))
            .ok_or_else(|| PdfError::InvalidStructure("catalog has no Pages reference".to_string()))?;
        let tree = Arc::new(PageTree::load(self, pages_id, self.options.parse.max_nesting_depth)?);

        if let Ok(mut pages) = self.pages.write() {
            *pages = Some(tree.clone());
        }
        Ok(tree)
    }

    pub fn page_count(&self) -> Result<usize> {
        Ok(self.page_tree()?.len())
    }

    /// Page `index` with its inherited attributes.
    pub fn page(&self, index: usize) -> Result<ParsedPage> {
        let tree = self.page_tree()?;
        if index >= tree.len() {
            return Err(PdfError::InvalidPageIndex(index));
        }
        Ok(tree.page(self, index)?)
    }

    /// The page's content streams, decoded and joined by newlines.
    pub fn page_contents(&self, index: usize) -> Result<Vec<u8>> {
        let page = self.page(index)?;
        Ok(self.contents_of(&page))
    }

    fn contents_of(&self, page: &ParsedPage) -> Vec<u8> {
        let mut content = Vec::new();
        for entry in page.content_refs() {
            let resolved = self.follow(&entry);
            let Object::Stream(stream) = &*resolved else {
                warn!("Content entry of page {} is a {}", page.id, resolved.type_name());
                continue;
            };
            match self.decode_stream(stream) {
                Ok(decoded) => {
                    if !content.is_empty() {
                        content.push(b'\n');
                    }
                    content.extend_from_slice(&decoded);
                }
                Err(err) => warn!("Skipping content stream of page {}: {}", page.id, err),
            }
        }
        content
    }

    pub fn interpret_page(&self, index: usize) -> Result<ShapeList> {
        self.interpret_page_with(index, None)
    }

    /// Interpret page `index`, checking `cancel` before every token. A
    /// cancelled run returns the shapes built so far, marked incomplete.
    pub fn interpret_page_with(&self, index: usize, cancel: Option<&CancellationToken>) -> Result<ShapeList> {
        let page = self.page(index)?;
        let content = self.contents_of(&page);

        let mut interpreter = Interpreter::new(self, page.resources.clone(), &self.options.interpreter);
        if let Some(token) = cancel {
            interpreter = interpreter.with_cancellation(token);
        }
        Ok(interpreter.run(&content))
    }

    /// Just the bytes an incremental update would append.
    pub fn incremental_update(&self) -> Result<Vec<u8>> {
        writer::build_delta(self)
    }

    /// Write the loaded revision and the update to `sink`.
    pub fn append_revision<W: Write>(&self, sink: &mut W) -> Result<u64> {
        writer::append_revision(self, sink)
    }

    /// Append the update to `path`, which must still hold exactly the loaded
    /// revision. The update goes out in one write; on failure the file is
    /// truncated back to its old length. Returns the bytes appended.
    pub fn append_to_file<P: AsRef<Path>>(&self, path: P) -> Result<u64> {
        let path = path.as_ref();
        let _lock = lock_sources();
        let delta = writer::build_delta(self)?;
        if delta.is_empty() {
            return Ok(0);
        }

        let mut file = OpenOptions::new().append(true).open(path)?;
        let original_len = file.metadata()?.len();
        if original_len != self.data().len() as u64 {
            return Err(PdfError::InvalidStructure(format!(
                "{} is {} bytes but the loaded revision is {}",
                path.display(),
                original_len,
                self.data().len()
            )));
        }

        if let Err(err) = file.write_all(&delta).and_then(|()| file.sync_all()) {
            warn!("Appending to {} failed, truncating: {}", path.display(), err);
            if let Err(truncate_err) = file.set_len(original_len) {
                warn!("Truncating {} failed: {}", path.display(), truncate_err);
            }
            return Err(err.into());
        }
        Ok(delta.len() as u64)
    }
}

impl Resolve for Document {
    fn resolve(&self, id: ObjectId) -> Arc<Object> {
        Document::resolve(self, id)
    }
}

impl ContentSource for Document {
    fn decode_stream(&self, stream: &Stream) -> Result<Arc<Vec<u8>>> {
        Document::decode_stream(self, stream)
    }
}

/// Ask the provider for a handler when the trailer names an `Encrypt`
/// dictionary, and install it in the store.
fn install_security(store: &ObjectStore, provider: Option<&dyn SecurityProvider>) -> Result<()> {
    let trailer = store.xref().trailer();
    let Some(encrypt) = trailer.encrypt() else {
        return Ok(());
    };
    let Some(provider) = provider else {
        return Err(PdfError::Security(
            "document is encrypted and no security provider was given".to_string(),
        ));
    };

    // Resolved before the handler exists, so it is read in the clear
    let (dict, exempt) = match encrypt {
        Object::Reference(id) => (store.resolve(*id), Some(*id)),
        direct => (Arc::new(direct.clone()), None),
    };
    let Some(dict) = dict.as_dict() else {
        return Err(PdfError::Security("Encrypt entry is not a dictionary".to_string()));
    };

    let handler = provider
        .handler_for(dict, trailer.first_id())
        .map_err(|e| PdfError::Security(e.to_string()))?;
    store.set_security(handler, exempt);
    Ok(())
}

fn has_catalog(store: &ObjectStore) -> bool {
    match store.xref().trailer().root() {
        Ok(root) => store.resolve(root).as_dict().is_some(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::Shape;
    use crate::objects::PdfString;
    use crate::parser::encryption_handler::tests::{xor_provider, XorHandler};
    use crate::parser::test_helpers::{build_pdf, build_pdf_with_trailer, create_minimal_pdf, create_single_page_pdf};
    use crate::parser::{rfind_bytes, SecurityHandler};
    use pretty_assertions::assert_eq;
    use std::io::Read;

    #[test]
    fn test_open_minimal() {
        let doc = Document::open(create_minimal_pdf()).unwrap();
        assert_eq!(doc.version(), Some(PdfVersion::new(1, 4)));
        assert!(!doc.is_recovered());
        assert_eq!(doc.page_count().unwrap(), 0);
        assert_eq!(doc.object_count(), 2);
        assert!(matches!(doc.page(0), Err(PdfError::InvalidPageIndex(0))));
    }

    #[test]
    fn test_interpret_single_page() {
        let doc = Document::open(create_single_page_pdf("BT /F1 12 Tf (AB) Tj ET")).unwrap();
        assert_eq!(doc.page_count().unwrap(), 1);
        assert_eq!(doc.page_contents(0).unwrap(), b"BT /F1 12 Tf (AB) Tj ET".to_vec());

        let shapes = doc.interpret_page(0).unwrap();
        let runs: Vec<_> = shapes.text_runs().collect();
        assert_eq!(runs.len(), 1);
        assert!((runs[0].advance - 1.2).abs() < 1e-12);
        assert!(matches!(shapes.shapes()[1], Shape::Fill { .. }));
    }

    #[test]
    fn test_cancelled_page_is_incomplete() {
        let doc = Document::open(create_single_page_pdf("0 0 m 1 1 l S")).unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let shapes = doc.interpret_page_with(0, Some(&token)).unwrap();
        assert!(shapes.is_incomplete());
    }

    #[test]
    fn test_mutations_are_visible_before_saving() {
        let doc = Document::open(create_minimal_pdf()).unwrap();
        let pages = ObjectId::new(2, 0);
        let original = doc.resolve(pages);

        doc.set_object(pages, Object::Integer(5));
        assert_eq!(*doc.resolve(pages), Object::Integer(5));
        assert!(doc.has_user_changes());

        doc.delete_object(pages);
        assert!(doc.is_missing(&doc.resolve(pages)));
        // The loaded revision is untouched
        assert_eq!(doc.store().resolve(pages), original);
    }

    #[test]
    fn test_created_objects_follow_the_index() {
        let doc = Document::open(create_minimal_pdf()).unwrap();
        let first = doc.create_object(Object::Boolean(true));
        let second = doc.create_object(Object::Null);
        assert_eq!(first, ObjectId::new(3, 0));
        assert_eq!(second, ObjectId::new(4, 0));
        assert_eq!(*doc.resolve(first), Object::Boolean(true));
    }

    #[test]
    fn test_synthetic_change_alone_is_not_a_user_change() {
        let doc = Document::open(create_minimal_pdf()).unwrap();
        doc.set_synthetic(ObjectId::new(2, 0), Object::Null);
        assert!(!doc.has_user_changes());
        assert!(!doc.incremental_update().unwrap().is_empty());
    }

    #[test]
    fn test_page_tree_cache_sees_edits() {
        let doc = Document::open(create_single_page_pdf("")).unwrap();
        assert_eq!(doc.page_count().unwrap(), 1);
        doc.set_object(
            ObjectId::new(2, 0),
            crate::parser::objects::parse_direct_object(
                b"<< /Type /Pages /Kids [] /Count 0 >>",
                &ParseOptions::lenient(),
            )
            .unwrap(),
        );
        assert_eq!(doc.page_count().unwrap(), 0);
    }

    #[test]
    fn test_broken_startxref_is_recovered() {
        let mut pdf = create_single_page_pdf("0 0 m 1 1 l S");
        let at = rfind_bytes(&pdf, b"startxref\n").unwrap();
        pdf.truncate(at);
        pdf.extend_from_slice(b"startxref\n12\n%%EOF\n");

        let doc = Document::open(pdf.clone()).unwrap();
        assert!(doc.is_recovered());
        assert_eq!(doc.page_count().unwrap(), 1);

        let strict = DocumentOptions::default().with_parse(ParseOptions::strict());
        assert!(Document::open_with_options(pdf, strict).is_err());
    }

    #[test]
    fn test_missing_root_is_fatal() {
        let pdf = build_pdf_with_trailer(&[(1, "<< /Type /Pages /Kids [] >>")], "");
        assert!(matches!(Document::open(pdf), Err(PdfError::MissingRoot)));
    }

    #[test]
    fn test_encrypted_without_provider() {
        let pdf = build_pdf_with_trailer(
            &[(1, "<< /Type /Catalog >>"), (2, "<< /Filter /Standard >>")],
            "/Root 1 0 R /Encrypt 2 0 R",
        );
        let err = Document::open(pdf).unwrap_err();
        assert!(err.is_security());
    }

    #[test]
    fn test_encrypted_strings_are_decrypted_on_load() {
        let secret = XorHandler.encrypt(ObjectId::new(3, 0), b"secret").unwrap();
        let hex: String = secret.iter().map(|b| format!("{b:02X}")).collect();
        let body = format!("<{hex}>");
        let pdf = build_pdf_with_trailer(
            &[
                (1, "<< /Type /Catalog >>"),
                (2, "<< /Filter /Xor >>"),
                (3, &body),
            ],
            "/Root 1 0 R /Encrypt 2 0 R /ID [<0102> <0102>]",
        );

        let doc = Document::open_with_security(pdf, DocumentOptions::default(), &xor_provider).unwrap();
        let value = doc.resolve(ObjectId::new(3, 0));
        let string = value.as_string().unwrap();
        assert_eq!(string.as_bytes(), b"secret");
        assert!(string.encrypted);
        assert!(doc.resolve(ObjectId::new(2, 0)).as_dict().unwrap().contains_key("Filter"));
    }

    #[test]
    fn test_append_to_file_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.pdf");
        std::fs::write(&path, build_pdf(&[(1, "<< /Type /Catalog >>"), (2, "(old)")])).unwrap();

        let doc = Document::open_file(&path, DocumentOptions::default()).unwrap();
        doc.set_object(ObjectId::new(2, 0), Object::String(PdfString::literal(b"new".to_vec())));
        let appended = doc.append_to_file(&path).unwrap();
        assert_eq!(appended as usize, doc.incremental_update().unwrap().len());

        // A second append against the now longer file is refused
        assert!(doc.append_to_file(&path).is_err());

        let mut bytes = Vec::new();
        std::fs::File::open(&path).unwrap().read_to_end(&mut bytes).unwrap();
        let reopened = Document::open(bytes).unwrap();
        assert!(!reopened.is_recovered());
        assert_eq!(
            *reopened.resolve(ObjectId::new(2, 0)),
            Object::String(PdfString::literal(b"new".to_vec()))
        );
    }
}
