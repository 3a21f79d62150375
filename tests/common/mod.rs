//! Shared builders for integration tests
//!
//! Documents mimic machine-translated output: every source section `sN`
//! has a target section `cxsN` pointing back at it, target links carry the
//! marked identifier of their source link, and target reference anchors
//! still carry their source element id.

#![allow(dead_code)]

use interlang::tree::{LinkMarkup, RefAnchor, RefData, RefNote, SectionMarkup};
use interlang::{
    ContentTree, Coordinator, Document, EngineConfig, MockTitleService, NodeId, NodeKind, Session,
};
use std::sync::Arc;

/// Session over en→fr with the given service
pub fn session(service: Arc<MockTitleService>) -> Arc<Session> {
    let config = EngineConfig::default().with_languages("en", "fr");
    Arc::new(Session::new(config, service).expect("valid config"))
}

/// Coordinator and the mock behind it, for request-count assertions
pub fn coordinator(service: MockTitleService) -> (Coordinator, Arc<MockTitleService>) {
    let service = Arc::new(service);
    (Coordinator::new(session(service.clone())), service)
}

/// Builds a source/target document one section at a time
pub struct ArticleBuilder {
    doc: Document,
    next_link: usize,
}

impl Default for ArticleBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ArticleBuilder {
    pub fn new() -> Self {
        Self {
            doc: Document::new(ContentTree::new("en"), ContentTree::new("fr")),
            next_link: 0,
        }
    }

    /// Add a section pair with one paragraph holding a link per title
    pub fn section(mut self, name: &str, titles: &[&str]) -> Self {
        self.add_section(name, titles, false);
        self
    }

    /// Same as `section`, but the target section is restored from a draft:
    /// its links are already adapted to `adapted` titles
    pub fn restored_section(mut self, name: &str, adapted: &[&str]) -> Self {
        self.add_section(name, adapted, true);
        self
    }

    fn add_section(&mut self, name: &str, titles: &[&str], restored: bool) {
        let source = self
            .doc
            .source
            .append(None, Some(name.to_string()), NodeKind::Section(SectionMarkup::new()))
            .expect("source section");
        let markup = SectionMarkup {
            restored,
            ..SectionMarkup::from_source(name)
        };
        let target = self
            .doc
            .target
            .append(None, Some(format!("cx{name}")), NodeKind::Section(markup))
            .expect("target section");
        let source_para = self.doc.source.append(Some(source), None, NodeKind::element("p")).expect("p");
        let target_para = self.doc.target.append(Some(target), None, NodeKind::element("p")).expect("p");

        for title in titles {
            let id = self.next_link.to_string();
            self.next_link += 1;
            let link = self
                .doc
                .source
                .append(Some(source_para), None, NodeKind::Link(LinkMarkup::new(*title).with_id(id.clone())))
                .expect("source link");
            self.doc.source.append(Some(link), None, NodeKind::text(*title)).expect("text");

            let mut markup = LinkMarkup::new(*title).with_id(format!("cx{id}"));
            markup.marks.target_link = restored;
            let link = self
                .doc
                .target
                .append(Some(target_para), None, NodeKind::Link(markup))
                .expect("target link");
            self.doc.target.append(Some(link), None, NodeKind::text(*title)).expect("text");
        }
    }

    /// Cite one footnote from each anchor id, in a section pair named
    /// `name`; only `carrier` holds the payload. The source reference list
    /// lives in its own section `refs-section`.
    pub fn citations(mut self, name: &str, anchors: &[&str], carrier: &str, content: &str) -> Self {
        let source = self.doc.source.by_dom_id(name).expect("source section exists");
        let target = self
            .doc
            .target
            .by_dom_id(&format!("cx{name}"))
            .expect("target section exists");
        for anchor in anchors {
            let mut markup = RefAnchor::new("[1]");
            if *anchor == carrier {
                markup.data = Some(RefData::with_html(content));
            }
            let node = self
                .doc
                .source
                .append(Some(source), Some(anchor.to_string()), NodeKind::Reference(markup))
                .expect("source anchor");
            self.doc.source.append(Some(node), None, NodeKind::text("[1]")).expect("label");

            let node = self
                .doc
                .target
                .append(Some(target), Some(anchor.to_string()), NodeKind::Reference(RefAnchor::new("[1]")))
                .expect("target anchor");
            self.doc.target.append(Some(node), None, NodeKind::text("[1]")).expect("label");
        }

        let list = match self.doc.source.reference_lists().first() {
            Some(list) => *list,
            None => {
                let section = self
                    .doc
                    .source
                    .append(None, Some("refs-section".into()), NodeKind::Section(SectionMarkup::new()))
                    .expect("reference section");
                self.doc
                    .source
                    .append(Some(section), Some("refs".into()), NodeKind::ReferenceList { data: None })
                    .expect("reference list")
            }
        };
        self.doc
            .source
            .append(
                Some(list),
                None,
                NodeKind::Note(RefNote {
                    backrefs: anchors.iter().map(|a| a.to_string()).collect(),
                    content: content.to_string(),
                    ..Default::default()
                }),
            )
            .expect("note");
        self
    }

    pub fn build(self) -> Document {
        self.doc
    }
}

/// Target section generated from source section `name`
pub fn target_section(doc: &Document, name: &str) -> NodeId {
    doc.target
        .by_dom_id(&format!("cx{name}"))
        .expect("target section exists")
}

/// Titles of the target links under a section, in order
pub fn target_titles(doc: &Document, section: NodeId) -> Vec<String> {
    doc.target
        .links_under(section)
        .into_iter()
        .map(|n| doc.target.link(n).expect("link").title.clone())
        .collect()
}
