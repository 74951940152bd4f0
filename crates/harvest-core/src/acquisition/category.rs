//! Destination category classification.
//!
//! A declared type tag from the source always wins. Without one, the
//! lowercased file path is matched against an ordered keyword table and the
//! first matching rule decides; a file matching nothing is a checkpoint.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Local category a downloaded file is placed into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestinationCategory {
    Checkpoint,
    Lora,
    Vae,
    Controlnet,
    Embedding,
    Hypernetwork,
    Upscaler,
    TextEncoder,
    DiffusionUnet,
    MotionModule,
    Wildcard,
    Other,
}

impl DestinationCategory {
    pub const ALL: [DestinationCategory; 12] = [
        DestinationCategory::Checkpoint,
        DestinationCategory::Lora,
        DestinationCategory::Vae,
        DestinationCategory::Controlnet,
        DestinationCategory::Embedding,
        DestinationCategory::Hypernetwork,
        DestinationCategory::Upscaler,
        DestinationCategory::TextEncoder,
        DestinationCategory::DiffusionUnet,
        DestinationCategory::MotionModule,
        DestinationCategory::Wildcard,
        DestinationCategory::Other,
    ];

    /// Canonical category name.
    pub fn as_str(&self) -> &'static str {
        match self {
            DestinationCategory::Checkpoint => "checkpoint",
            DestinationCategory::Lora => "lora",
            DestinationCategory::Vae => "vae",
            DestinationCategory::Controlnet => "controlnet",
            DestinationCategory::Embedding => "embedding",
            DestinationCategory::Hypernetwork => "hypernetwork",
            DestinationCategory::Upscaler => "upscaler",
            DestinationCategory::TextEncoder => "text_encoder",
            DestinationCategory::DiffusionUnet => "diffusion_unet",
            DestinationCategory::MotionModule => "motion_module",
            DestinationCategory::Wildcard => "wildcard",
            DestinationCategory::Other => "other",
        }
    }

    /// Directory name under the models root.
    pub fn dir_name(&self) -> &'static str {
        match self {
            DestinationCategory::Checkpoint => "checkpoints",
            DestinationCategory::Lora => "loras",
            DestinationCategory::Vae => "vae",
            DestinationCategory::Controlnet => "controlnet",
            DestinationCategory::Embedding => "embeddings",
            DestinationCategory::Hypernetwork => "hypernetworks",
            DestinationCategory::Upscaler => "upscale_models",
            DestinationCategory::TextEncoder => "text_encoders",
            DestinationCategory::DiffusionUnet => "diffusion_models",
            DestinationCategory::MotionModule => "motion_modules",
            DestinationCategory::Wildcard => "wildcards",
            DestinationCategory::Other => "other",
        }
    }

    /// Parse a category by canonical name or directory name (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().to_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == name || c.dir_name() == name)
    }
}

impl fmt::Display for DestinationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source-declared type tags and the category each maps to.
const TYPE_TABLE: &[(&str, DestinationCategory)] = &[
    ("Checkpoint", DestinationCategory::Checkpoint),
    ("LORA", DestinationCategory::Lora),
    ("LoCon", DestinationCategory::Lora),
    ("DoRA", DestinationCategory::Lora),
    ("TextualInversion", DestinationCategory::Embedding),
    ("AestheticGradient", DestinationCategory::Embedding),
    ("Hypernetwork", DestinationCategory::Hypernetwork),
    ("Controlnet", DestinationCategory::Controlnet),
    ("Poses", DestinationCategory::Controlnet),
    ("VAE", DestinationCategory::Vae),
    ("Upscaler", DestinationCategory::Upscaler),
    ("MotionModule", DestinationCategory::MotionModule),
    ("Wildcards", DestinationCategory::Wildcard),
    ("Other", DestinationCategory::Checkpoint),
];

/// Ordered filename keyword rules. Earlier rules shadow later ones.
const KEYWORD_RULES: &[(&[&str], DestinationCategory)] = &[
    (&["vae", "autoencoder"], DestinationCategory::Vae),
    (&["lora", "lycoris", "locon"], DestinationCategory::Lora),
    (&["text_encoder", "text-encoder"], DestinationCategory::TextEncoder),
    (&["unet", "diffusion_pytorch_model"], DestinationCategory::DiffusionUnet),
    (&["controlnet", "control"], DestinationCategory::Controlnet),
    (&["upscaler", "upscale", "esrgan"], DestinationCategory::Upscaler),
    (
        &["embedding", "textual_inversion", "textual-inversion", "textual"],
        DestinationCategory::Embedding,
    ),
    (&["hypernetwork"], DestinationCategory::Hypernetwork),
    (&["motion_module", "motion-module", "animatediff"], DestinationCategory::MotionModule),
    (&["wildcard"], DestinationCategory::Wildcard),
];

/// Repository name and tag patterns that imply a non-checkpoint type, as
/// type tags from [`TYPE_TABLE`]. Earlier rules shadow later ones.
const REPO_TYPE_RULES: &[(&[&str], &str)] = &[
    (&["lora"], "LORA"),
    (&["vae", "autoencoder"], "VAE"),
    (&["controlnet", "control"], "Controlnet"),
    (&["embedding", "textual-inversion", "textual_inversion"], "TextualInversion"),
    (&["upscaler", "upscale", "esrgan"], "Upscaler"),
    (&["hypernetwork"], "Hypernetwork"),
];

/// Keywords that mark a file as a component rather than the main model.
const COMPONENT_KEYWORDS: &[&str] = &[
    "vae",
    "lora",
    "text_encoder",
    "unet",
    "config",
    "preprocessor",
    "tokenizer",
    "scheduler",
];

/// Extensions of model weight files.
const MODEL_WEIGHT_EXTENSIONS: &[&str] = &[".safetensors", ".ckpt", ".pt", ".pth", ".gguf"];

/// How a category was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationBasis {
    TypeTag,
    Keyword,
    Fallback,
}

/// Maps a (type tag, filename) pair to a destination category.
#[derive(Debug, Clone, Copy, Default)]
pub struct CategoryClassifier;

impl CategoryClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classify a file. Never fails.
    pub fn classify(&self, type_tag: &str, filename: &str) -> DestinationCategory {
        self.classify_with_basis(type_tag, filename).0
    }

    /// Classify a file and report which rule decided.
    pub fn classify_with_basis(
        &self,
        type_tag: &str,
        filename: &str,
    ) -> (DestinationCategory, ClassificationBasis) {
        if let Some(category) = Self::lookup_type_tag(type_tag) {
            return (category, ClassificationBasis::TypeTag);
        }

        let lowered = filename.to_lowercase();
        for (keywords, category) in KEYWORD_RULES {
            if keywords.iter().any(|k| lowered.contains(k)) {
                return (*category, ClassificationBasis::Keyword);
            }
        }

        (DestinationCategory::Checkpoint, ClassificationBasis::Fallback)
    }

    /// Exact lookup of a declared type tag.
    pub fn lookup_type_tag(type_tag: &str) -> Option<DestinationCategory> {
        TYPE_TABLE
            .iter()
            .find(|(tag, _)| *tag == type_tag)
            .map(|(_, category)| *category)
    }

    /// Type tag implied by a repository's name, then by its tags, for
    /// sources that declare no type of their own. `None` means the files
    /// are classified one by one.
    pub fn infer_repo_type_tag(repo_id: &str, tags: &[String]) -> Option<&'static str> {
        let name = repo_id.rsplit('/').next().unwrap_or(repo_id).to_lowercase();
        let matching = |text: &str| {
            REPO_TYPE_RULES
                .iter()
                .find(|(patterns, _)| patterns.iter().any(|p| text.contains(p)))
                .map(|(_, tag)| *tag)
        };
        matching(&name).or_else(|| tags.iter().find_map(|tag| matching(&tag.to_lowercase())))
    }

    /// The static type-tag table.
    pub fn type_table() -> &'static [(&'static str, DestinationCategory)] {
        TYPE_TABLE
    }

    /// The ordered filename keyword rules.
    pub fn keyword_rules() -> &'static [(&'static [&'static str], DestinationCategory)] {
        KEYWORD_RULES
    }
}

/// Whether a file is a main model weight file rather than a component.
///
/// Main files carry a weight extension and none of the component keywords.
pub fn is_main_model_file(filename: &str) -> bool {
    let lowered = filename.to_lowercase();
    if !has_weight_extension(&lowered) {
        return false;
    }
    !COMPONENT_KEYWORDS.iter().any(|k| lowered.contains(k))
}

/// Whether a file carries a model weight extension.
pub fn has_weight_extension(filename: &str) -> bool {
    let lowered = filename.to_lowercase();
    MODEL_WEIGHT_EXTENSIONS
        .iter()
        .any(|ext| lowered.ends_with(ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_tag_overrides_filename() {
        let classifier = CategoryClassifier::new();
        assert_eq!(
            classifier.classify("VAE", "my-checkpoint.safetensors"),
            DestinationCategory::Vae
        );
        assert_eq!(
            classifier.classify("LORA", "some_vae_fix.safetensors"),
            DestinationCategory::Lora
        );
        assert_eq!(
            classifier.classify_with_basis("Checkpoint", "detail_lora.safetensors"),
            (DestinationCategory::Checkpoint, ClassificationBasis::TypeTag)
        );
    }

    #[test]
    fn test_type_tag_lookup_is_exact() {
        assert_eq!(CategoryClassifier::lookup_type_tag("vae"), None);
        assert_eq!(CategoryClassifier::lookup_type_tag("LoCon"), Some(DestinationCategory::Lora));
        assert_eq!(
            CategoryClassifier::lookup_type_tag("Other"),
            Some(DestinationCategory::Checkpoint)
        );
    }

    #[test]
    fn test_keyword_fallback() {
        let classifier = CategoryClassifier::new();
        let cases = [
            ("sdxl_vae.safetensors", DestinationCategory::Vae),
            ("vae/diffusion_pytorch_model.safetensors", DestinationCategory::Vae),
            ("unet/diffusion_pytorch_model.safetensors", DestinationCategory::DiffusionUnet),
            ("text_encoder/model.safetensors", DestinationCategory::TextEncoder),
            ("add_detail_lora.safetensors", DestinationCategory::Lora),
            ("control_v11p_sd15_canny.pth", DestinationCategory::Controlnet),
            ("4x-UltraSharp-ESRGAN.pth", DestinationCategory::Upscaler),
            ("easynegative_embedding.pt", DestinationCategory::Embedding),
            ("anime_hypernetwork.pt", DestinationCategory::Hypernetwork),
            ("mm_sd_v15_motion_module.ckpt", DestinationCategory::MotionModule),
            ("wildcards_pack.txt", DestinationCategory::Wildcard),
        ];
        for (filename, expected) in cases {
            assert_eq!(
                classifier.classify("", filename),
                expected,
                "filename {}",
                filename
            );
        }
    }

    #[test]
    fn test_rule_order_resolves_overlaps() {
        let classifier = CategoryClassifier::new();
        // lora is listed before controlnet
        assert_eq!(
            classifier.classify("", "controlnet-lora-rank128.safetensors"),
            DestinationCategory::Lora
        );
        // vae is listed before lora
        assert_eq!(
            classifier.classify("", "lora_with_vae.safetensors"),
            DestinationCategory::Vae
        );
    }

    #[test]
    fn test_unrecognized_tag_falls_back_to_filename() {
        let classifier = CategoryClassifier::new();
        assert_eq!(
            classifier.classify("text-to-image", "my_lora.safetensors"),
            DestinationCategory::Lora
        );
    }

    #[test]
    fn test_classification_is_total() {
        let classifier = CategoryClassifier::new();
        assert_eq!(
            classifier.classify_with_basis("", ""),
            (DestinationCategory::Checkpoint, ClassificationBasis::Fallback)
        );
        assert_eq!(
            classifier.classify("", "my-model.safetensors"),
            DestinationCategory::Checkpoint
        );
        assert_eq!(
            classifier.classify("", "diffusion-00001-of-00003.safetensors"),
            DestinationCategory::Checkpoint
        );
    }

    #[test]
    fn test_repo_type_from_name_then_tags() {
        let none: Vec<String> = Vec::new();
        assert_eq!(
            CategoryClassifier::infer_repo_type_tag("org/anime-lora", &none),
            Some("LORA")
        );
        assert_eq!(
            CategoryClassifier::infer_repo_type_tag("stabilityai/sd-vae-ft-mse", &none),
            Some("VAE")
        );
        assert_eq!(
            CategoryClassifier::infer_repo_type_tag(
                "org/styles",
                &["diffusers".to_string(), "LoRA".to_string()]
            ),
            Some("LORA")
        );
        assert_eq!(
            CategoryClassifier::infer_repo_type_tag(
                "stabilityai/stable-diffusion-xl-base-1.0",
                &["diffusers".to_string(), "text-to-image".to_string()]
            ),
            None
        );
    }

    #[test]
    fn test_inferred_repo_types_are_known_tags() {
        for (_, tag) in REPO_TYPE_RULES {
            assert!(CategoryClassifier::lookup_type_tag(tag).is_some(), "{}", tag);
        }
    }

    #[test]
    fn test_is_main_model_file() {
        assert!(is_main_model_file("v1-5-pruned-emaonly.safetensors"));
        assert!(is_main_model_file("model.ckpt"));
        assert!(!is_main_model_file("vae/diffusion_pytorch_model.safetensors"));
        assert!(!is_main_model_file("model_index.json"));
        assert!(!is_main_model_file("scheduler/scheduler_config.json"));
        assert!(!is_main_model_file("detail_lora.safetensors"));
    }

    #[test]
    fn test_category_names_roundtrip() {
        for category in DestinationCategory::ALL {
            assert_eq!(DestinationCategory::from_name(category.as_str()), Some(category));
            assert_eq!(DestinationCategory::from_name(category.dir_name()), Some(category));
        }
        assert_eq!(
            DestinationCategory::from_name("Text-Encoder"),
            Some(DestinationCategory::TextEncoder)
        );
        assert_eq!(DestinationCategory::from_name("bogus"), None);
    }
}
