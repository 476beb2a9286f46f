//! Minimal English inflection for mapping association names to class names.

/// `appointments` -> `appointment`, `categories` -> `category`, `addresses` -> `address`.
pub fn singularize(word: &str) -> String {
    if let Some(stem) = word.strip_suffix("ies") {
        format!("{stem}y")
    } else if word.ends_with("sses") || word.ends_with("xes") || word.ends_with("ches") {
        word[..word.len() - 2].to_string()
    } else if word.ends_with('s') && !word.ends_with("ss") {
        word[..word.len() - 1].to_string()
    } else {
        word.to_string()
    }
}

/// `profile` -> `profiles`, `category` -> `categories`.
pub fn pluralize(word: &str) -> String {
    if word.ends_with('y') && !word.ends_with("ey") && !word.ends_with("ay") && !word.ends_with("oy") {
        format!("{}ies", &word[..word.len() - 1])
    } else if word.ends_with('s') || word.ends_with('x') || word.ends_with("ch") {
        format!("{word}es")
    } else {
        format!("{word}s")
    }
}

/// `line_item` -> `LineItem`, `admin/user` -> `Admin::User`.
pub fn camelize(word: &str) -> String {
    word.split('/')
        .map(|part| {
            part.split('_')
                .filter(|s| !s.is_empty())
                .map(|s| {
                    let mut chars = s.chars();
                    match chars.next() {
                        Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                        None => String::new(),
                    }
                })
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("::")
}

/// `LineItem` -> `line_item`, `Admin::User` -> `admin/user`.
pub fn underscore(word: &str) -> String {
    let mut out = String::with_capacity(word.len() + 4);
    for (i, segment) in word.split("::").enumerate() {
        if i > 0 {
            out.push('/');
        }
        let mut prev_lower = false;
        for c in segment.chars() {
            if c.is_uppercase() {
                if prev_lower {
                    out.push('_');
                }
                out.extend(c.to_lowercase());
                prev_lower = false;
            } else {
                out.push(c);
                prev_lower = c.is_lowercase() || c.is_ascii_digit();
            }
        }
    }
    out
}
