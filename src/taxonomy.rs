use crate::models::{Category, Subcategory, Tag, TrackTagRef};
use crate::slug::{slugify, uniquify};

/// The tree seeded on first run.
pub fn default_taxonomy() -> Vec<Category> {
    fn tags(names: &[&str]) -> Vec<Tag> {
        let mut out: Vec<Tag> = Vec::new();
        for name in names {
            let id = uniquify(&slugify(name), out.iter().map(|t| t.id.as_str()));
            out.push(Tag {
                id,
                name: name.to_string(),
            });
        }
        out
    }

    fn sub(name: &str, tag_names: &[&str]) -> Subcategory {
        Subcategory {
            id: slugify(name),
            name: name.to_string(),
            tags: tags(tag_names),
        }
    }

    vec![
        Category {
            id: "genre".into(),
            name: "Genre".into(),
            subcategories: vec![
                sub("House", &["Deep", "Tech", "Afro", "Progressive", "Soulful"]),
                sub("Techno", &["Melodic", "Peak Time", "Minimal", "Hard"]),
                sub("Breaks", &["Drum & Bass", "Breakbeat", "UK Garage"]),
                sub("Downtempo", &["Ambient", "Chill", "Organic"]),
            ],
        },
        Category {
            id: "mood".into(),
            name: "Mood".into(),
            subcategories: vec![
                sub("Feel", &["Dark", "Euphoric", "Groovy", "Hypnotic", "Uplifting"]),
                sub("Atmosphere", &["Driving", "Dreamy", "Emotional", "Raw"]),
            ],
        },
        Category {
            id: "elements".into(),
            name: "Elements".into(),
            subcategories: vec![
                sub("Vocals", &["Male Vocal", "Female Vocal", "Spoken Word", "Instrumental"]),
                sub("Instruments", &["Piano", "Synth", "Guitar", "Percussion", "Strings"]),
            ],
        },
        Category {
            id: "set".into(),
            name: "Set".into(),
            subcategories: vec![
                sub("Position", &["Warm Up", "Build", "Peak", "Closing"]),
                sub("Mixing", &["Long Intro", "Clean Outro", "Tool", "Solid"]),
            ],
        },
    ]
}

pub fn find_category<'a>(categories: &'a [Category], category_id: &str) -> Option<&'a Category> {
    categories.iter().find(|c| c.id == category_id)
}

pub fn find_subcategory<'a>(
    categories: &'a [Category],
    category_id: &str,
    subcategory_id: &str,
) -> Option<&'a Subcategory> {
    find_category(categories, category_id)?
        .subcategories
        .iter()
        .find(|s| s.id == subcategory_id)
}

pub fn find_tag<'a>(categories: &'a [Category], tag: &TrackTagRef) -> Option<&'a Tag> {
    find_subcategory(categories, &tag.category_id, &tag.subcategory_id)?
        .tags
        .iter()
        .find(|t| t.id == tag.tag_id)
}

/// Display name of the tag a reference points at, if it still resolves.
pub fn tag_name<'a>(categories: &'a [Category], tag: &TrackTagRef) -> Option<&'a str> {
    find_tag(categories, tag).map(|t| t.name.as_str())
}

fn category_mut<'a>(categories: &'a mut [Category], category_id: &str) -> Option<&'a mut Category> {
    categories.iter_mut().find(|c| c.id == category_id)
}

fn subcategory_mut<'a>(
    categories: &'a mut [Category],
    category_id: &str,
    subcategory_id: &str,
) -> Option<&'a mut Subcategory> {
    category_mut(categories, category_id)?
        .subcategories
        .iter_mut()
        .find(|s| s.id == subcategory_id)
}

// ─── Categories ──────────────────────────────────────────────────

/// Appends a new category and returns its id.
pub fn add_category(categories: &mut Vec<Category>, name: &str) -> String {
    let id = uniquify(&slugify(name), categories.iter().map(|c| c.id.as_str()));
    categories.push(Category {
        id: id.clone(),
        name: name.to_string(),
        subcategories: Vec::new(),
    });
    id
}

/// Returns `true` if a category was removed.
pub fn remove_category(categories: &mut Vec<Category>, category_id: &str) -> bool {
    let before = categories.len();
    categories.retain(|c| c.id != category_id);
    categories.len() != before
}

pub fn rename_category(categories: &mut [Category], category_id: &str, name: &str) -> bool {
    match category_mut(categories, category_id) {
        Some(category) => {
            category.name = name.to_string();
            true
        }
        None => false,
    }
}

// ─── Subcategories ───────────────────────────────────────────────

/// Appends a subcategory to `category_id`; `None` if the category is gone.
pub fn add_subcategory(categories: &mut [Category], category_id: &str, name: &str) -> Option<String> {
    let category = category_mut(categories, category_id)?;
    let id = uniquify(
        &slugify(name),
        category.subcategories.iter().map(|s| s.id.as_str()),
    );
    category.subcategories.push(Subcategory {
        id: id.clone(),
        name: name.to_string(),
        tags: Vec::new(),
    });
    Some(id)
}

pub fn remove_subcategory(categories: &mut [Category], category_id: &str, subcategory_id: &str) -> bool {
    let Some(category) = category_mut(categories, category_id) else {
        return false;
    };
    let before = category.subcategories.len();
    category.subcategories.retain(|s| s.id != subcategory_id);
    category.subcategories.len() != before
}

pub fn rename_subcategory(
    categories: &mut [Category],
    category_id: &str,
    subcategory_id: &str,
    name: &str,
) -> bool {
    match subcategory_mut(categories, category_id, subcategory_id) {
        Some(subcategory) => {
            subcategory.name = name.to_string();
            true
        }
        None => false,
    }
}

// ─── Tags ────────────────────────────────────────────────────────

pub fn add_tag(
    categories: &mut [Category],
    category_id: &str,
    subcategory_id: &str,
    name: &str,
) -> Option<String> {
    let subcategory = subcategory_mut(categories, category_id, subcategory_id)?;
    let id = uniquify(&slugify(name), subcategory.tags.iter().map(|t| t.id.as_str()));
    subcategory.tags.push(Tag {
        id: id.clone(),
        name: name.to_string(),
    });
    Some(id)
}

pub fn remove_tag(categories: &mut [Category], tag: &TrackTagRef) -> bool {
    let Some(subcategory) = subcategory_mut(categories, &tag.category_id, &tag.subcategory_id) else {
        return false;
    };
    let before = subcategory.tags.len();
    subcategory.tags.retain(|t| t.id != tag.tag_id);
    subcategory.tags.len() != before
}

pub fn rename_tag(categories: &mut [Category], tag: &TrackTagRef, name: &str) -> bool {
    let Some(subcategory) = subcategory_mut(categories, &tag.category_id, &tag.subcategory_id) else {
        return false;
    };
    match subcategory.tags.iter_mut().find(|t| t.id == tag.tag_id) {
        Some(t) => {
            t.name = name.to_string();
            true
        }
        None => false,
    }
}

/// Every tag in the tree as a reference, in display order.
pub fn all_tag_refs(categories: &[Category]) -> Vec<TrackTagRef> {
    categories
        .iter()
        .flat_map(|c| {
            c.subcategories.iter().flat_map(move |s| {
                s.tags
                    .iter()
                    .map(move |t| TrackTagRef::new(&c.id, &s.id, &t.id))
            })
        })
        .collect()
}
