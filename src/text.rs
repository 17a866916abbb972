//! Small string helpers shared by the form handlers.

/// Trims, strips control characters, and caps the length in characters.
pub fn clamp_string(value: &str, max_len: usize, trim: bool) -> String {
    let base = if trim { value.trim() } else { value };
    base.chars()
        .filter(|ch| {
            let code = *ch as u32;
            code >= 32 && code != 127
        })
        .take(max_len)
        .collect()
}

pub fn digits_only(value: &str) -> String {
    value.chars().filter(|ch| ch.is_ascii_digit()).collect()
}

/// Lower-cases and removes Portuguese diacritics for matching.
pub fn fold(value: &str) -> String {
    value
        .chars()
        .flat_map(|ch| ch.to_lowercase())
        .map(|ch| match ch {
            'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'í' | 'ì' | 'î' | 'ï' => 'i',
            'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
            'ú' | 'ù' | 'û' | 'ü' => 'u',
            'ç' => 'c',
            'ñ' => 'n',
            other => other,
        })
        .collect()
}

/// Collapses runs of whitespace to single spaces.
pub fn squash_spaces(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}
