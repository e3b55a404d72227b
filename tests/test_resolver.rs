
use std::path::PathBuf;

use fixtures::*;
use pretty_assertions::assert_eq;

use evt::message_resolver::{
    lookup_message_in_files, MessageResolver, ResolutionOrigin, CATEGORY_FALLBACK_MASK,
    EVENTLOG_REGISTRY_ROOT, PUBLISHERS_REGISTRY_ROOT,
};

#[test]
fn legacy_registry_key_wins() {
    ensure_env_logger_initialized();

    let registry = FakeRegistry::default().with_key(
        &format!("{EVENTLOG_REGISTRY_ROOT}\\System\\DiskSub"),
        &[
            ("EventMessageFile", r"C:\drivers\disk.dll;C:\win\netmsg.dll"),
            ("ParameterMessageFile", r"C:\win\kernel32.dll"),
        ],
    );
    let publishers = FakePublishers::default();

    let resolver = MessageResolver::new(&registry, &publishers);
    let resolved = resolver.resolve("System", "DiskSub");

    assert_eq!(resolved.origin, ResolutionOrigin::LegacyRegistry);
    assert_eq!(
        resolved.message_files,
        vec![
            PathBuf::from(r"C:\drivers\disk.dll"),
            PathBuf::from(r"C:\win\netmsg.dll"),
        ]
    );
    assert_eq!(
        resolved.parameter_files,
        vec![PathBuf::from(r"C:\win\kernel32.dll")]
    );
}

#[test]
fn provider_guid_redirects_to_the_publisher_key() {
    ensure_env_logger_initialized();

    let guid = "{12345678-1234-1234-1234-123456789abc}";
    let registry = FakeRegistry::default()
        .with_key(
            &format!("{EVENTLOG_REGISTRY_ROOT}\\Application\\ModernSource"),
            &[("ProviderGuid", guid)],
        )
        .with_key(
            &format!("{PUBLISHERS_REGISTRY_ROOT}\\{guid}"),
            &[
                ("MessageFileName", r"C:\win\modern.dll"),
                ("ParameterMessageFile", r"C:\win\modern-params.dll"),
            ],
        );

    let publishers = FakePublishers::default();
    let resolver = MessageResolver::new(&registry, &publishers);
    let resolved = resolver.resolve("Application", "ModernSource");

    assert_eq!(resolved.origin, ResolutionOrigin::LegacyRegistry);
    assert_eq!(
        resolved.message_files,
        vec![PathBuf::from(r"C:\win\modern.dll")]
    );
    assert_eq!(
        resolved.parameter_files,
        vec![PathBuf::from(r"C:\win\modern-params.dll")]
    );
}

#[test]
fn publisher_metadata_is_used_only_when_the_subkey_is_absent() {
    ensure_env_logger_initialized();

    // Eight prefix characters ahead of each real path.
    let publishers = FakePublishers::default().with_publisher(
        "MeteredSource",
        Some(r"xxxxxxxxC:\win\params.dll"),
        Some(r"xxxxxxxxC:\win\messages.dll"),
    );

    let registry = FakeRegistry::default();
    let resolver = MessageResolver::new(&registry, &publishers);
    let resolved = resolver.resolve("Application", "MeteredSource");

    assert_eq!(resolved.origin, ResolutionOrigin::PublisherMetadata);
    assert_eq!(
        resolved.message_files,
        vec![PathBuf::from(r"C:\win\messages.dll")]
    );
    assert_eq!(
        resolved.parameter_files,
        vec![PathBuf::from(r"C:\win\params.dll")]
    );
}

#[test]
fn a_present_but_empty_subkey_still_claims_the_source() {
    ensure_env_logger_initialized();

    let registry = FakeRegistry::default().with_key(
        &format!("{EVENTLOG_REGISTRY_ROOT}\\Application\\BareSource"),
        &[],
    );
    // A publisher also exists, but the legacy key takes precedence.
    let publishers = FakePublishers::default().with_publisher(
        "BareSource",
        None,
        Some(r"xxxxxxxxC:\win\unused.dll"),
    );

    let resolver = MessageResolver::new(&registry, &publishers);
    let resolved = resolver.resolve("Application", "BareSource");

    assert_eq!(resolved.origin, ResolutionOrigin::LegacyRegistry);
    assert!(resolved.is_empty());
}

#[test]
fn unknown_source_resolves_to_an_empty_template_list() {
    ensure_env_logger_initialized();

    let registry = FakeRegistry::default();
    let publishers = FakePublishers::default();
    let resolver = MessageResolver::new(&registry, &publishers);
    let resolved = resolver.resolve("Application", "Ghost");

    assert!(resolved.is_empty());
    assert!(resolved.message_files.is_empty());
    assert!(resolved.parameter_files.is_empty());
}

#[test]
fn candidate_files_are_tried_in_order() {
    ensure_env_logger_initialized();

    let files = vec![
        PathBuf::from(r"C:\missing.dll"),
        PathBuf::from(r"C:\empty.dll"),
        PathBuf::from(r"C:\hit.dll"),
    ];
    let messages = FakeMessageFiles::default()
        .with_file(r"C:\empty.dll", &[(700, "")])
        .with_file(r"C:\hit.dll", &[(700, "The %1 service entered a stop state.")]);

    assert_eq!(
        lookup_message_in_files(&messages, &files, 700).as_deref(),
        Some("The %1 service entered a stop state.")
    );
}

#[test]
fn direct_miss_retries_with_the_high_bit_mask() {
    ensure_env_logger_initialized();

    let files = vec![PathBuf::from(r"C:\cat.dll")];
    let messages = FakeMessageFiles::default().with_file(
        r"C:\cat.dll",
        &[(3 | CATEGORY_FALLBACK_MASK, "Category Three")],
    );

    assert_eq!(
        lookup_message_in_files(&messages, &files, 3).as_deref(),
        Some("Category Three")
    );
    assert_eq!(lookup_message_in_files(&messages, &files, 4), None);
}

#[test]
fn exhausted_candidates_yield_none() {
    ensure_env_logger_initialized();

    let files = vec![PathBuf::from(r"C:\missing.dll")];
    let messages = FakeMessageFiles::default();

    assert_eq!(lookup_message_in_files(&messages, &files, 1), None);
    assert_eq!(lookup_message_in_files(&messages, &[], 1), None);
}
