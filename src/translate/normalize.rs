//! Source-language resolution for translate requests.
//! "auto" (or empty) source languages are detected from the context with whatlang.

/// Detects the dominant language of `text` using whatlang.
/// Returns an ISO 639-1 code or None if detection is unreliable.
pub fn detect_language(text: &str) -> Option<String> {
    let info = whatlang::detect(text)?;
    if !info.is_reliable() {
        return None;
    }
    lang_to_code(info.lang()).map(str::to_string)
}

fn lang_to_code(lang: whatlang::Lang) -> Option<&'static str> {
    use whatlang::Lang::*;
    let code = match lang {
        Eng => "en",
        Cmn => "zh",
        Jpn => "ja",
        Kor => "ko",
        Fra => "fr",
        Deu => "de",
        Spa => "es",
        Rus => "ru",
        Por => "pt",
        Ita => "it",
        Ara => "ar",
        Hin => "hi",
        Tur => "tr",
        Vie => "vi",
        Tha => "th",
        Nld => "nl",
        Pol => "pl",
        Ukr => "uk",
        Swe => "sv",
        Dan => "da",
        Fin => "fi",
        Ces => "cs",
        Ell => "el",
        Heb => "he",
        Ind => "id",
        _ => return None,
    };
    Some(code)
}

/// Resolve the caller's source language. Explicit codes pass through;
/// "auto" or "" fall back to detection over `sample`.
pub fn resolve_source_lang(source_lang: &str, sample: &str) -> Option<String> {
    let trimmed = source_lang.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("auto") {
        detect_language(sample)
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_source_passes_through() {
        assert_eq!(resolve_source_lang("es", "whatever"), Some("es".to_string()));
        assert_eq!(resolve_source_lang(" fr ", ""), Some("fr".to_string()));
    }

    #[test]
    fn auto_detects_from_sample() {
        let sample = "El gato se sentó en la alfombra y miró por la ventana durante toda la tarde.";
        assert_eq!(resolve_source_lang("auto", sample), Some("es".to_string()));
    }

    #[test]
    fn auto_with_no_signal_is_none() {
        assert_eq!(resolve_source_lang("auto", ""), None);
    }
}
