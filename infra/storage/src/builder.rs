use crate::engine::{FlexStorage, FlexStorageInner};
use crate::error::{Result, StorageError, StorageErrorExt, op};
use crate::file;
use crate::folder::{FolderOps, LocalFolders};
use crate::index::DiskIndex;
use crate::key::{KeyCodec, MAX_KEY_LENGTH};
use crate::layout::LayoutKind;
use crate::meta::ObjectMetaCache;
use crate::options::{DEFAULT_RECORD_FILE, DEFAULT_SHARED_FILE, StorageOptions};
use crate::pattern::PathPattern;
use crate::resolver::{PathResolver, PlainResolver};
use flex_formatter::{FormatterKind, RecordFormatter};
use parking_lot::Mutex;
use private::Sealed;
use std::borrow::Cow;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use tracing::info;

#[derive(Debug, Default)]
pub struct NoFolder;
#[derive(Debug)]
pub struct WithFolder;

mod private {
    pub(super) trait Sealed {}
}
impl Sealed for NoFolder {}
impl Sealed for WithFolder {}

/// Fluent, type-checked configuration of a [`FlexStorage`].
///
/// [`open`](FlexStorageBuilder::open) only exists once a root folder has been set.
#[allow(private_bounds)]
#[derive(Debug, Default)]
pub struct FlexStorageBuilder<S: Sealed = NoFolder> {
    state: S,
    config: StorageOptions,
    formatter: Option<Arc<dyn RecordFormatter>>,
    resolver: Option<Arc<dyn PathResolver>>,
    folders: Option<Arc<dyn FolderOps>>,
}

#[allow(private_bounds)]
impl<S: Sealed> FlexStorageBuilder<S> {
    #[must_use = "Sets the physical layout of records"]
    pub const fn layout(mut self, layout: LayoutKind) -> Self {
        self.config.layout = layout;
        self
    }

    #[must_use = "Sets the path template of record files"]
    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.config.pattern = Some(pattern.into());
        self
    }

    #[must_use = "Selects one of the stock formatters"]
    pub const fn formatter_kind(mut self, kind: FormatterKind) -> Self {
        self.config.formatter = Some(kind);
        self
    }

    #[must_use = "Sets a custom record formatter"]
    pub fn formatter(mut self, formatter: Arc<dyn RecordFormatter>) -> Self {
        self.formatter = Some(formatter);
        self
    }

    #[must_use = "Sets the record (or shared) file name"]
    pub fn file(mut self, file: impl Into<String>) -> Self {
        self.config.file = Some(file.into());
        self
    }

    #[must_use = "Sets the field that carries the key on returned rows"]
    pub fn key_field(mut self, field: impl Into<String>) -> Self {
        self.config.key_field = field.into();
        self
    }

    #[must_use = "Sets the length of generated keys"]
    pub const fn key_length(mut self, length: usize) -> Self {
        self.config.key_length = length;
        self
    }

    #[must_use = "Sets whether keys are case-sensitive"]
    pub const fn case_sensitive(mut self, enable: bool) -> Self {
        self.config.case_sensitive = enable;
        self
    }

    #[must_use = "Overrides prefix sharding detected from the pattern"]
    pub const fn prefixed(mut self, enable: bool) -> Self {
        self.config.prefixed = Some(enable);
        self
    }

    #[must_use = "Sets whether the key index is persisted"]
    pub const fn indexed(mut self, enable: bool) -> Self {
        self.config.indexed = enable;
        self
    }

    #[must_use = "Sets the sub-map of the shared file this storage owns"]
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.prefix = Some(prefix.into());
        self
    }

    #[must_use = "Sets whether deleting a record removes its directory"]
    pub const fn delete_folder(mut self, enable: bool) -> Self {
        self.config.delete_folder = enable;
        self
    }

    #[must_use = "Sets the capacity of the meta cache"]
    pub const fn meta_cache_capacity(mut self, capacity: u64) -> Self {
        self.config.meta_cache_capacity = capacity;
        self
    }

    #[must_use = "Sets whether the root folder should be created if it does not exist"]
    pub const fn create(mut self, enable: bool) -> Self {
        self.config.create = enable;
        self
    }

    #[must_use = "Sets the resolver for stream paths"]
    pub fn resolver(mut self, resolver: Arc<dyn PathResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    #[must_use = "Sets the directory primitives"]
    pub fn folders(mut self, folders: Arc<dyn FolderOps>) -> Self {
        self.folders = Some(folders);
        self
    }

    fn transition<N: Sealed>(self, state: N) -> FlexStorageBuilder<N> {
        FlexStorageBuilder {
            state,
            config: self.config,
            formatter: self.formatter,
            resolver: self.resolver,
            folders: self.folders,
        }
    }
}

impl FlexStorageBuilder<NoFolder> {
    #[must_use = "Creates a new storage builder with default configuration"]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use = "Sets the root folder of the storage"]
    pub fn folder(mut self, folder: impl Into<String>) -> FlexStorageBuilder<WithFolder> {
        self.config.folder = folder.into();
        self.transition(WithFolder)
    }

    /// Starts from declarative options; the folder they name is taken as set.
    #[must_use = "Creates a storage builder from options"]
    pub fn from_options(options: StorageOptions) -> FlexStorageBuilder<WithFolder> {
        Self { config: options, ..Self::default() }.transition(WithFolder)
    }
}

impl FlexStorageBuilder<WithFolder> {
    /// Validates the configuration and opens the storage.
    ///
    /// Boot sequence:
    /// 1. **Validation**: root, key length, pattern and formatter are checked up front.
    /// 2. **Resolution**: the root is mapped through the [`PathResolver`].
    /// 3. **Bootstrapping**: the root directory is created if `create(true)` was set.
    /// 4. **Self-Healing**: temp files abandoned by interrupted writes are removed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::BadConfiguration`] if:
    /// - the root folder is empty, or missing while `create(false)` is set,
    /// - the key length is outside `1..=64`,
    /// - the pattern is malformed for the layout,
    /// - the formatter extension is not recognised.
    ///
    /// Returns [`StorageError::Io`] if the root cannot be created.
    pub fn open(self) -> Result<FlexStorage> {
        let mut config = self.config;
        let layout = config.layout;

        let mut folder = config.folder.trim().trim_end_matches('/').to_owned();
        if folder.is_empty() {
            return Err(bad("storage root missing", "folder"));
        }
        if !(1..=MAX_KEY_LENGTH).contains(&config.key_length) {
            return Err(bad(
                format!("key length {} outside 1..={MAX_KEY_LENGTH}", config.key_length),
                "key_length",
            ));
        }

        let mut sniffed = None;
        if layout == LayoutKind::Shared
            && let Some((parent, stem, kind)) = split_shared_file(&folder)
        {
            config.file.get_or_insert(stem);
            sniffed = Some(kind);
            folder = parent;
        }

        let pattern_src = config.pattern.as_deref().unwrap_or(layout.default_pattern());
        let pattern = PathPattern::new(pattern_src, layout)?;

        let formatter = match (self.formatter, config.formatter, pattern.extension()) {
            (Some(formatter), _, _) => formatter,
            (None, Some(kind), _) => kind.build(),
            (None, None, Some(ext)) => FormatterKind::from_extension(ext)
                .map_err(|e| bad(e.to_string(), "pattern"))?
                .build(),
            (None, None, None) => sniffed.unwrap_or_default().build(),
        };

        let default_file =
            if layout == LayoutKind::Shared { DEFAULT_SHARED_FILE } else { DEFAULT_RECORD_FILE };
        let file = pattern
            .file()
            .map(str::to_owned)
            .or(config.file)
            .unwrap_or_else(|| default_file.to_owned());

        let resolver = self.resolver.unwrap_or_else(|| Arc::new(PlainResolver));
        let folders = self.folders.unwrap_or_else(|| Arc::new(LocalFolders));

        let root = resolver.resolve(&folder)?;
        if config.create {
            folders.create(&root).context(op("open", root.display()))?;
            info!(path = %root.display(), layout = %layout, "Bootstrapped storage root directory");
        } else if !root.is_dir() {
            return Err(bad(format!("storage root {} does not exist", root.display()), "folder"));
        }

        let prefixed = config.prefixed.unwrap_or_else(|| pattern.is_prefixed());
        let index = (config.indexed && layout != LayoutKind::Shared).then(|| DiskIndex::new(&root));

        file::purge_tmp(&root);

        Ok(FlexStorage {
            inner: Arc::new(FlexStorageInner {
                extension: formatter.default_file_extension().to_owned(),
                folder,
                root,
                layout,
                pattern,
                codec: KeyCodec::new(config.case_sensitive, config.key_length, file),
                formatter,
                resolver,
                folders,
                meta: ObjectMetaCache::new(config.meta_cache_capacity),
                key_field: config.key_field,
                prefixed,
                index,
                prefix: config.prefix.filter(|p| !p.is_empty()),
                delete_container: layout.can_delete_container(config.delete_folder),
                table: Mutex::new(None),
                tmp_counter: AtomicU64::new(1),
            }),
        })
    }
}

/// Splits `/data/users.yaml` into `/data`, `users` and the formatter its extension names.
fn split_shared_file(folder: &str) -> Option<(String, String, FormatterKind)> {
    let path = Path::new(folder);
    let kind = FormatterKind::detect(path).ok()?;
    let stem = path.file_stem()?.to_str()?.to_owned();
    let parent = path.parent()?.to_str()?.trim_end_matches('/').to_owned();
    if parent.is_empty() {
        return None;
    }
    Some((parent, stem, kind))
}

fn bad(message: impl Into<Cow<'static, str>>, option: &'static str) -> StorageError {
    StorageError::BadConfiguration { message: message.into(), context: Some(option.into()) }
}
