//! English-centric inflection for default relation names.
//!
//! Only what default foreign keys and inverse names need: pluralize,
//! singularize and snake_case conversion of entity names.

const UNCOUNTABLE: &[&str] = &["equipment", "information", "media", "metadata", "series", "species"];

const IRREGULAR: &[(&str, &str)] = &[
    ("person", "people"),
    ("child", "children"),
    ("man", "men"),
    ("woman", "women"),
];

fn is_consonant_y(word: &str) -> bool {
    word.ends_with('y')
        && !["ay", "ey", "iy", "oy", "uy"].iter().any(|suffix| word.ends_with(suffix))
}

/// Pluralize the last word of a snake_case name (`video_tag` → `video_tags`)
pub fn pluralize(name: &str) -> String {
    let (head, word) = split_last_word(name);
    let lower = word.to_lowercase();
    if UNCOUNTABLE.contains(&lower.as_str()) {
        return name.to_string();
    }
    if let Some((_, plural)) = IRREGULAR.iter().find(|(singular, _)| *singular == lower) {
        return format!("{head}{plural}");
    }
    if IRREGULAR.iter().any(|(_, plural)| *plural == lower) {
        return name.to_string();
    }
    let plural = if is_consonant_y(word) {
        format!("{}ies", &word[..word.len() - 1])
    } else if word.ends_with("ids") || word.ends_with("ies") {
        word.to_string()
    } else if word.ends_with('s')
        || word.ends_with("sh")
        || word.ends_with("ch")
        || word.ends_with('x')
        || word.ends_with('z')
    {
        format!("{word}es")
    } else {
        format!("{word}s")
    };
    format!("{head}{plural}")
}

/// Singularize the last word of a snake_case name (`categories` → `category`)
pub fn singularize(name: &str) -> String {
    let (head, word) = split_last_word(name);
    let lower = word.to_lowercase();
    if UNCOUNTABLE.contains(&lower.as_str()) {
        return name.to_string();
    }
    if let Some((singular, _)) = IRREGULAR.iter().find(|(_, plural)| *plural == lower) {
        return format!("{head}{singular}");
    }
    let singular = if let Some(stem) = word.strip_suffix("ies") {
        format!("{stem}y")
    } else if ["ses", "ches", "shes", "xes", "zes"].iter().any(|suffix| word.ends_with(suffix)) {
        word[..word.len() - 2].to_string()
    } else if word.ends_with("ss") || word.len() <= 1 {
        word.to_string()
    } else if let Some(stem) = word.strip_suffix('s') {
        stem.to_string()
    } else {
        word.to_string()
    };
    format!("{head}{singular}")
}

/// `VideoTag` / `video-tag` / `Admin::User` → `video_tag` / `video_tag` / `user`
pub fn underscore(name: &str) -> String {
    let name = name.rsplit("::").next().unwrap_or(name);
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for ch in name.chars() {
        if ch == '-' || ch == ' ' {
            out.push('_');
            prev_lower = false;
        } else if ch.is_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
            prev_lower = false;
        } else {
            out.push(ch);
            prev_lower = ch.is_lowercase() || ch.is_ascii_digit();
        }
    }
    out
}

/// Default foreign key pointing at `entity` (`videos` → `video_id`)
pub fn foreign_key(entity: &str) -> String {
    format!("{}_id", singularize(&underscore(entity)))
}

fn split_last_word(name: &str) -> (&str, &str) {
    match name.rfind('_') {
        Some(pos) => name.split_at(pos + 1),
        None => ("", name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pluralize() {
        assert_eq!(pluralize("tag"), "tags");
        assert_eq!(pluralize("category"), "categories");
        assert_eq!(pluralize("day"), "days");
        assert_eq!(pluralize("box"), "boxes");
        assert_eq!(pluralize("video_id"), "video_ids");
        assert_eq!(pluralize("tag_ids"), "tag_ids");
        assert_eq!(pluralize("person"), "people");
        assert_eq!(pluralize("series"), "series");
    }

    #[test]
    fn test_singularize() {
        assert_eq!(singularize("tags"), "tag");
        assert_eq!(singularize("categories"), "category");
        assert_eq!(singularize("boxes"), "box");
        assert_eq!(singularize("people"), "person");
        assert_eq!(singularize("address"), "address");
        assert_eq!(singularize("video_tags"), "video_tag");
    }

    #[test]
    fn test_underscore() {
        assert_eq!(underscore("VideoTag"), "video_tag");
        assert_eq!(underscore("Admin::User"), "user");
        assert_eq!(underscore("videos"), "videos");
    }

    #[test]
    fn test_foreign_key() {
        assert_eq!(foreign_key("videos"), "video_id");
        assert_eq!(foreign_key("Video"), "video_id");
        assert_eq!(foreign_key("categories"), "category_id");
    }
}
