use serde::{Deserialize, Serialize};

/// The eight content kinds the Repository Facades and Cache Manager's
/// content domain handle uniformly. Generalizes the teacher's per-module
/// repositories (`CustomersRepository`, `ProductsRepository`, ...) into one
/// tagged discriminant rather than duplicated types per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ContentKind {
    StoryFragment,
    Pane,
    Menu,
    Resource,
    TractStack,
    File,
    Belief,
    Epinet,
}

impl ContentKind {
    pub const ALL: [ContentKind; 8] = [
        ContentKind::StoryFragment,
        ContentKind::Pane,
        ContentKind::Menu,
        ContentKind::Resource,
        ContentKind::TractStack,
        ContentKind::File,
        ContentKind::Belief,
        ContentKind::Epinet,
    ];

    /// The backing table name, used by the generic repository to build its
    /// SQL without per-kind duplication.
    pub fn table_name(self) -> &'static str {
        match self {
            ContentKind::StoryFragment => "storyfragments",
            ContentKind::Pane => "panes",
            ContentKind::Menu => "menus",
            ContentKind::Resource => "resources",
            ContentKind::TractStack => "tractstacks",
            ContentKind::File => "files",
            ContentKind::Belief => "beliefs",
            ContentKind::Epinet => "epinets",
        }
    }
}

/// Zero-sized tag types carrying a `ContentKind` as an associated constant,
/// so `ContentRepository<K>` can be instantiated once per kind without a
/// runtime match on every call (spec §4.5/§9 "tagged variants, not subtype
/// inheritance").
pub trait ContentKindTag: Send + Sync + 'static {
    const KIND: ContentKind;
}

macro_rules! content_kind_tag {
    ($name:ident, $kind:expr) => {
        pub struct $name;
        impl ContentKindTag for $name {
            const KIND: ContentKind = $kind;
        }
    };
}

content_kind_tag!(StoryFragmentKind, ContentKind::StoryFragment);
content_kind_tag!(PaneKind, ContentKind::Pane);
content_kind_tag!(MenuKind, ContentKind::Menu);
content_kind_tag!(ResourceKind, ContentKind::Resource);
content_kind_tag!(TractStackKind, ContentKind::TractStack);
content_kind_tag!(FileKind, ContentKind::File);
content_kind_tag!(BeliefKind, ContentKind::Belief);
content_kind_tag!(EpinetKind, ContentKind::Epinet);
