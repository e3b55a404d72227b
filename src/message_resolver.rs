//! Message-template resolution.
//!
//! Two generations of Windows logging describe where a source's message and
//! parameter templates live: the legacy registry tree under
//! `Services\EventLog`, and the modern publisher metadata keyed by source
//! name. Resolution is an ordered chain over the two: the first strategy
//! that *recognizes* the source wins, even if it yields no files, and total
//! exhaustion is an empty (never erroring) result.

use std::path::{Path, PathBuf};

use log::debug;
use serde::Serialize;

use crate::utils::expand_env;

/// Root of the legacy per-log registry tree.
pub const EVENTLOG_REGISTRY_ROOT: &str = r"SYSTEM\CurrentControlSet\Services\EventLog";

/// Root of the publisher tree a `ProviderGuid` value redirects to.
pub const PUBLISHERS_REGISTRY_ROOT: &str =
    r"SOFTWARE\Microsoft\Windows\CurrentVersion\WINEVT\Publishers";

/// High-bit pattern retried after a direct message-id miss. Windows files
/// category and fallback messages under ids with these bits set.
pub const CATEGORY_FALLBACK_MASK: u32 = 0xB000_0000;

/// Paths returned by the publisher metadata query carry a fixed-size
/// non-path prefix that must be stripped before use.
pub const PUBLISHER_PATH_PREFIX: usize = 8;

/// Read-only view over a registry hive.
pub trait RegistryView {
    /// Opens a subkey by backslash-separated path, rooted at the local
    /// machine hive. `None` when the key does not exist.
    fn open_key(&self, path: &str) -> Option<Box<dyn RegistryKey + '_>>;
}

/// One opened registry key.
pub trait RegistryKey {
    /// Reads a string value, expanded or not. `None` when absent.
    fn string_value(&self, name: &str) -> Option<String>;
}

/// The raw file paths published for a source through publisher metadata,
/// prefix and environment tokens still intact.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublisherMetadata {
    pub parameter_file: Option<String>,
    pub message_file: Option<String>,
}

/// Query surface over publisher metadata, keyed by source name.
pub trait PublisherCatalog {
    fn open_publisher(&self, source: &str) -> Option<PublisherMetadata>;
}

/// Loader for message-file modules. Implementations load the file as a
/// data-only resource module; the returned handle releases the module when
/// dropped, on every exit path.
pub trait MessageProvider {
    fn open_module(&self, path: &Path) -> Option<Box<dyn MessageModule + '_>>;
}

/// One loaded message module.
pub trait MessageModule {
    /// Formats the message with the given id, inserts untouched. `None` or
    /// an empty string both count as a miss.
    fn message(&self, id: u32) -> Option<String>;
}

/// Which generation produced a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResolutionOrigin {
    LegacyRegistry,
    PublisherMetadata,
}

/// The result of message resolution for one `(log, source)` pair: ordered
/// candidate lists for parameter and message templates.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTemplateSource {
    pub parameter_files: Vec<PathBuf>,
    pub message_files: Vec<PathBuf>,
    pub origin: ResolutionOrigin,
}

impl ResolvedTemplateSource {
    pub fn empty(origin: ResolutionOrigin) -> Self {
        ResolvedTemplateSource {
            parameter_files: Vec::new(),
            message_files: Vec::new(),
            origin,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.parameter_files.is_empty() && self.message_files.is_empty()
    }
}

/// Resolves `(log, source)` pairs to template file candidates.
///
/// Constructed fresh per lookup set; holds no state beyond its seams.
pub struct MessageResolver<'a> {
    registry: &'a dyn RegistryView,
    publishers: &'a dyn PublisherCatalog,
}

impl<'a> MessageResolver<'a> {
    pub fn new(registry: &'a dyn RegistryView, publishers: &'a dyn PublisherCatalog) -> Self {
        MessageResolver {
            registry,
            publishers,
        }
    }

    /// Tries the legacy registry tree, then publisher metadata. A missing
    /// key or publisher silently advances the chain; exhaustion yields an
    /// empty source, not an error.
    pub fn resolve(&self, log_name: &str, source_name: &str) -> ResolvedTemplateSource {
        if let Some(resolved) = self.try_legacy_registry(log_name, source_name) {
            return resolved;
        }

        if let Some(resolved) = self.try_publisher_metadata(source_name) {
            return resolved;
        }

        debug!("no template source found for {log_name}\\{source_name}");
        ResolvedTemplateSource::empty(ResolutionOrigin::PublisherMetadata)
    }

    /// `None` only when the source subkey does not exist at all; a present
    /// but valueless key still claims the source for the legacy generation.
    fn try_legacy_registry(
        &self,
        log_name: &str,
        source_name: &str,
    ) -> Option<ResolvedTemplateSource> {
        let key_path = format!("{EVENTLOG_REGISTRY_ROOT}\\{log_name}\\{source_name}");
        let key = self.registry.open_key(&key_path)?;

        let mut parameter_files = candidate_paths(key.string_value("ParameterMessageFile"));
        let mut message_files = candidate_paths(key.string_value("EventMessageFile"));

        if parameter_files.is_empty() && message_files.is_empty() {
            if let Some(guid) = key.string_value("ProviderGuid") {
                debug!("{key_path} redirects to publisher {guid}");
                let publisher_path = format!("{PUBLISHERS_REGISTRY_ROOT}\\{guid}");
                if let Some(publisher_key) = self.registry.open_key(&publisher_path) {
                    parameter_files =
                        candidate_paths(publisher_key.string_value("ParameterMessageFile"));
                    message_files = candidate_paths(publisher_key.string_value("MessageFileName"));
                }
            }
        }

        Some(ResolvedTemplateSource {
            parameter_files,
            message_files,
            origin: ResolutionOrigin::LegacyRegistry,
        })
    }

    fn try_publisher_metadata(&self, source_name: &str) -> Option<ResolvedTemplateSource> {
        let metadata = self.publishers.open_publisher(source_name)?;

        let clean = |raw: Option<String>| -> Vec<PathBuf> {
            raw.as_deref()
                .map(strip_publisher_prefix)
                .map(|path| candidate_paths(Some(path.to_string())))
                .unwrap_or_default()
        };

        Some(ResolvedTemplateSource {
            parameter_files: clean(metadata.parameter_file),
            message_files: clean(metadata.message_file),
            origin: ResolutionOrigin::PublisherMetadata,
        })
    }
}

fn strip_publisher_prefix(raw: &str) -> &str {
    match raw.char_indices().nth(PUBLISHER_PATH_PREFIX) {
        Some((byte_offset, _)) => &raw[byte_offset..],
        None => "",
    }
}

/// Splits a semicolon-separated file list into usable paths: entries are
/// trimmed, blank ones skipped, embedded NULs stripped, and environment
/// tokens expanded.
pub fn candidate_paths(value: Option<String>) -> Vec<PathBuf> {
    let Some(value) = value else {
        return Vec::new();
    };

    value
        .split(';')
        .map(|entry| entry.trim().replace('\0', ""))
        .filter(|entry| !entry.is_empty())
        .map(|entry| PathBuf::from(expand_env(&entry)))
        .collect()
}

/// Walks a candidate file list looking for a nonempty message.
///
/// Each file is loaded as a scoped module and asked for `id`; an empty
/// answer is retried once on the same module with the high-bit fallback
/// mask. The first nonempty result wins; a file that fails to load or
/// answers empty twice is skipped.
pub fn lookup_message_in_files(
    provider: &dyn MessageProvider,
    files: &[PathBuf],
    id: u32,
) -> Option<String> {
    for file in files {
        let Some(module) = provider.open_module(file) else {
            debug!("could not load message file {}", file.display());
            continue;
        };

        for attempt in [id, id | CATEGORY_FALLBACK_MASK] {
            if let Some(message) = module.message(attempt).filter(|m| !m.is_empty()) {
                return Some(message);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    struct NoRegistry;
    impl RegistryView for NoRegistry {
        fn open_key(&self, _path: &str) -> Option<Box<dyn RegistryKey + '_>> {
            None
        }
    }

    struct NoPublishers;
    impl PublisherCatalog for NoPublishers {
        fn open_publisher(&self, _source: &str) -> Option<PublisherMetadata> {
            None
        }
    }

    #[test]
    fn unknown_source_resolves_to_empty_not_error() {
        let resolver = MessageResolver::new(&NoRegistry, &NoPublishers);
        let resolved = resolver.resolve("Application", "NoSuchSource");

        assert!(resolved.is_empty());
    }

    #[test]
    fn candidate_paths_clean_up_entries() {
        let value = Some(format!(
            " C:\\one.dll ;; \0 ;C:\\tw\0o.dll;{}",
            r"C:\three.dll"
        ));

        assert_eq!(
            candidate_paths(value),
            vec![
                PathBuf::from(r"C:\one.dll"),
                PathBuf::from(r"C:\two.dll"),
                PathBuf::from(r"C:\three.dll"),
            ]
        );
        assert_eq!(candidate_paths(None), Vec::<PathBuf>::new());
    }

    #[test]
    fn publisher_prefix_is_stripped() {
        assert_eq!(strip_publisher_prefix("12345678C:\\x.dll"), "C:\\x.dll");
        assert_eq!(strip_publisher_prefix("short"), "");
    }
}
