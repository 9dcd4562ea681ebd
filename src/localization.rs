use anyhow::Result;
use fluent_bundle::concurrent::FluentBundle;
use fluent_bundle::{FluentArgs, FluentResource, FluentValue};
use std::collections::HashMap;
use unic_langid::LanguageIdentifier;

use crate::scan_errors::ScanError;

/// Language used when the client's language is unknown or unsupported
pub const DEFAULT_LANGUAGE: &str = "ar";

const RESOURCES: [(&str, &str); 2] = [
    ("ar", include_str!("../locales/ar/main.ftl")),
    ("en", include_str!("../locales/en/main.ftl")),
];

/// Localization manager for scan messages
pub struct LocalizationManager {
    bundles: HashMap<String, FluentBundle<FluentResource>>,
}

impl std::fmt::Debug for LocalizationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut languages: Vec<&String> = self.bundles.keys().collect();
        languages.sort();
        f.debug_struct("LocalizationManager")
            .field("languages", &languages)
            .finish()
    }
}

impl LocalizationManager {
    /// Create a manager holding every bundled locale
    pub fn new() -> Result<Self> {
        let mut bundles = HashMap::new();

        for (locale_str, source) in RESOURCES {
            let locale: LanguageIdentifier = locale_str.parse()?;
            let bundle = Self::create_bundle(locale, source)?;
            bundles.insert(locale_str.to_string(), bundle);
        }

        Ok(Self { bundles })
    }

    /// Create a fluent bundle for a specific locale
    fn create_bundle(locale: LanguageIdentifier, source: &str) -> Result<FluentBundle<FluentResource>> {
        let mut bundle = FluentBundle::new_concurrent(vec![locale.clone()]);
        // Bidi isolation marks would leak into plain-text JSON responses
        bundle.set_use_isolating(false);

        let resource = FluentResource::try_new(source.to_string())
            .map_err(|(_, errors)| anyhow::anyhow!("Invalid FTL for {}: {:?}", locale, errors))?;
        bundle
            .add_resource(resource)
            .map_err(|errors| anyhow::anyhow!("Duplicate FTL messages for {}: {:?}", locale, errors))?;

        Ok(bundle)
    }

    /// Get a localized message in a specific language
    pub fn get_message_in_language(
        &self,
        key: &str,
        language: &str,
        args: Option<&HashMap<&str, String>>,
    ) -> String {
        let bundle = match self
            .bundles
            .get(language)
            .or_else(|| self.bundles.get(DEFAULT_LANGUAGE))
        {
            Some(bundle) => bundle,
            None => return format!("Missing translation: {}", key),
        };

        let pattern = match bundle.get_message(key).and_then(|msg| msg.value()) {
            Some(pattern) => pattern,
            None => return format!("Missing translation: {}", key),
        };

        let fluent_args = args.map(|args| {
            let mut fluent_args = FluentArgs::new();
            for (name, value) in args {
                fluent_args.set(*name, FluentValue::from(value.clone()));
            }
            fluent_args
        });

        let mut errors = vec![];
        let value = bundle.format_pattern(pattern, fluent_args.as_ref(), &mut errors);
        if !errors.is_empty() {
            tracing::debug!(key = %key, language = %language, "Fluent formatting errors: {:?}", errors);
        }
        value.into_owned()
    }

    /// Get a localized message with arguments in a specific language
    pub fn get_message_with_args_in_language(
        &self,
        key: &str,
        language: &str,
        args: &[(&str, String)],
    ) -> String {
        let args_map: HashMap<&str, String> = args.iter().cloned().collect();
        self.get_message_in_language(key, language, Some(&args_map))
    }

    /// Check if a language is supported
    pub fn is_language_supported(&self, language: &str) -> bool {
        self.bundles.contains_key(language)
    }

    /// Pick the first supported language from a code or an `Accept-Language` value
    pub fn detect_language(&self, language_code: Option<&str>) -> String {
        if let Some(header) = language_code {
            for candidate in header.split(',') {
                // "ar-SA;q=0.9" -> "ar"
                let tag = candidate.split(';').next().unwrap_or("").trim();
                let lang = tag.split(['-', '_']).next().unwrap_or("").to_lowercase();
                if self.is_language_supported(&lang) {
                    return lang;
                }
            }
        }

        DEFAULT_LANGUAGE.to_string()
    }

    /// User-facing message for a fatal scan error
    pub fn scan_error_message(&self, error: &ScanError, language: &str) -> String {
        let attempts = error.failures().len().to_string();
        self.get_message_with_args_in_language(error.message_key(), language, &[("attempts", attempts)])
    }
}
