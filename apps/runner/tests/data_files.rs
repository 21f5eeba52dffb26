use hdesk_core::{
    CHAT_NAMESPACE, FaqCatalog, HANDOFF_NOTICE_KEY, HI_BLOCK, StaticFaqCatalog, StaticTextBundle,
    TextBundle, WELCOME_BLOCK,
};

fn data(name: &str) -> std::path::PathBuf {
    std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("data")
        .join(name)
}

#[test]
fn bundled_faq_has_opening_blocks() {
    let faq = StaticFaqCatalog::from_path(data("faq.yaml")).unwrap();
    assert_eq!(faq.require(WELCOME_BLOCK).unwrap().data.len(), 3);
    assert!(faq.require(HI_BLOCK).is_ok());
    assert!(faq.require("documents").is_ok());
}

#[test]
fn bundled_texts_cover_the_handoff_notice() {
    let texts = StaticTextBundle::from_path(data("texts.yaml"))
        .unwrap()
        .with_fallback_language("en");
    for language in ["en", "cs", "de"] {
        let notice = texts.text(language, CHAT_NAMESPACE, HANDOFF_NOTICE_KEY);
        assert_ne!(notice, HANDOFF_NOTICE_KEY, "{language}");
    }
}
