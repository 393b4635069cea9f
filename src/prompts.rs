//! Prompt text sent to the generation API.

use serde::{Deserialize, Serialize};

use crate::tokens::DesignTokens;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateType {
    Landing,
    Form,
    Card,
    #[default]
    General,
}

impl TemplateType {
    pub fn as_str(self) -> &'static str {
        match self {
            TemplateType::Landing => "landing",
            TemplateType::Form => "form",
            TemplateType::Card => "card",
            TemplateType::General => "general",
        }
    }

    pub fn hint(self) -> &'static str {
        match self {
            TemplateType::Landing => "Create full-page hero with CTA, features, testimonials.",
            TemplateType::Form => "Style inputs with bg-input, border-border, rounded-md. Include validation.",
            TemplateType::Card => "Use bg-muted, border, rounded-lg, shadow-md. Add hover effects.",
            TemplateType::General => "Modern, responsive UI with design tokens.",
        }
    }

    /// Guesses the template from keywords in the request, English or Korean.
    pub fn detect(prompt: &str) -> Self {
        const LANDING: &[&str] = &["landing", "hero", "홈페이지", "메인 페이지", "랜딩"];
        const FORM: &[&str] = &["form", "login", "signup", "register", "input", "폼", "로그인", "회원가입", "입력"];
        const CARD: &[&str] = &["card", "profile", "product", "카드", "프로필", "상품"];

        let lower = prompt.to_lowercase();
        let mentions = |words: &[&str]| words.iter().any(|word| lower.contains(word));
        if mentions(LANDING) {
            TemplateType::Landing
        } else if mentions(FORM) {
            TemplateType::Form
        } else if mentions(CARD) {
            TemplateType::Card
        } else {
            TemplateType::General
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StylePreset {
    #[default]
    Default,
    Light,
    Modern,
}

impl StylePreset {
    pub fn as_str(self) -> &'static str {
        match self {
            StylePreset::Default => "default",
            StylePreset::Light => "light",
            StylePreset::Modern => "modern",
        }
    }

    pub fn context(self) -> &'static str {
        match self {
            StylePreset::Default => "Dark theme with modern, minimalist aesthetics",
            StylePreset::Light => "Light theme with clean, bright aesthetics",
            StylePreset::Modern => "Modern theme with bold colors and strong contrasts",
        }
    }
}

const VISION_ADDENDUM: &str = "\n\n🎨 VISION MODE - IMAGE REFERENCE:
The user has provided a reference image. Your task:
1. Carefully analyze the image's design, layout, colors, UI patterns, and visual hierarchy
2. Create a similar component using React and Tailwind CSS
3. Match the visual style, spacing, typography, and structure as closely as possible
4. Follow all the rules above (no imports, whitelisted Tailwind classes only, etc.)
5. If the image shows a specific UI pattern (card, form, navigation, etc.), replicate that pattern

IMPORTANT: Focus on visual similarity while maintaining code quality and accessibility.";

const REFERENCE_IMAGE_MARKER: &str = "[Reference image request]";
const REFERENCE_IMAGE_SUFFIX: &str = "Make the design look like the image above.";

pub fn build_system_prompt(tokens: &DesignTokens, has_image: bool) -> String {
    let colors = tokens
        .core_colors()
        .iter()
        .map(|(key, value)| format!("{key}=\"{value}\""))
        .collect::<Vec<_>>()
        .join(" ");
    let radius = tokens.radius.keys().map(String::as_str).collect::<Vec<_>>().join(", ");
    let spacing = tokens.spacing.keys().take(6).map(String::as_str).collect::<Vec<_>>().join(", ");

    let mut prompt = format!(
        r#"You are a React component generator. Create modern, beautiful UI components.

RULES:
1. Output format: "export default function ComponentName() {{...}}"
2. Use plain JavaScript (NO TypeScript types like : Type)
3. NO import statements - hooks already available: useState, useEffect, useRef, useCallback, useMemo
4. NO external images/URLs - use Tailwind bg-* or placeholder colors
5. NO fetch/axios/network requests
6. Use semantic HTML + ARIA for accessibility

DESIGN TOKENS:
Colors: {colors}
Radius: {radius}
Spacing: {spacing}

TAILWIND CLASSES:
- Colors: bg-{{color}}, text-{{color}}, border-{{color}}
- Layout: flex, grid, relative, absolute
- Spacing: p-*, m-*, gap-*, space-*
- Sizing: w-full, h-screen, max-w-*
- Effects: hover:*, transition-*, opacity-*, scale-*
- Standard utilities available

OUTPUT:
Return ONLY the code. NO markdown, NO explanations, NO ``` blocks."#
    );
    if has_image {
        prompt.push_str(VISION_ADDENDUM);
    }
    prompt
}

pub struct UserPrompt<'a> {
    pub prompt: &'a str,
    pub template: TemplateType,
    pub style: StylePreset,
    pub retry_reason: Option<&'a str>,
    /// Set on the first attempt of a request with a reference image.
    pub reference_image: bool,
}

pub fn build_user_prompt(input: &UserPrompt<'_>) -> String {
    let mut prompt = format!(
        "TEMPLATE: {}\nHINT: {}\nSTYLE: {}\n\nUSER REQUEST:\n{}\n\nREQUIREMENTS:\n- Use design tokens colors (bg, fg, primary, muted, etc.)\n- Responsive + accessible\n- Smooth transitions\n- NO external resources",
        input.template.as_str().to_uppercase(),
        input.template.hint(),
        input.style.context(),
        input.prompt
    );
    if let Some(reason) = input.retry_reason {
        prompt.push_str(&format!("\n\n⚠️ FIX REQUIRED: {reason}"));
    }
    if input.reference_image {
        prompt = format!("{REFERENCE_IMAGE_MARKER}\n\n{prompt}\n\n{REFERENCE_IMAGE_SUFFIX}");
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(prompt: &str) -> UserPrompt<'_> {
        UserPrompt {
            prompt,
            template: TemplateType::General,
            style: StylePreset::Default,
            retry_reason: None,
            reference_image: false,
        }
    }

    #[test]
    fn detects_templates_from_keywords() {
        assert_eq!(TemplateType::detect("A SaaS landing page"), TemplateType::Landing);
        assert_eq!(TemplateType::detect("Login form with remember me"), TemplateType::Form);
        assert_eq!(TemplateType::detect("상품 카드"), TemplateType::Card);
        assert_eq!(TemplateType::detect("회원가입 화면"), TemplateType::Form);
        assert_eq!(TemplateType::detect("Create a simple button component"), TemplateType::General);
    }

    #[test]
    fn system_prompt_lists_core_tokens() {
        let tokens = DesignTokens::embedded().unwrap();
        let prompt = build_system_prompt(&tokens, false);
        assert!(prompt.contains(&format!("bg=\"{}\"", tokens.colors["bg"])));
        assert!(prompt.contains("Radius: sm, md, lg, xl, 2xl"));
        assert!(prompt.contains("Spacing: xs, sm, md, lg, xl, 2xl\n"));
        assert!(prompt.contains("bg-{color}"));
        assert!(!prompt.contains("VISION MODE"));
        assert!(build_system_prompt(&tokens, true).contains("VISION MODE"));
    }

    #[test]
    fn retry_reason_is_appended() {
        let mut input = request("A pricing table");
        input.retry_reason = Some("Script tags are not allowed");
        let prompt = build_user_prompt(&input);
        assert!(prompt.starts_with("TEMPLATE: GENERAL\nHINT: Modern, responsive UI with design tokens."));
        assert!(prompt.ends_with("⚠️ FIX REQUIRED: Script tags are not allowed"));
    }

    #[test]
    fn reference_image_wraps_the_prompt() {
        let mut input = request("Copy this");
        input.reference_image = true;
        let prompt = build_user_prompt(&input);
        assert!(prompt.starts_with(REFERENCE_IMAGE_MARKER));
        assert!(prompt.ends_with(REFERENCE_IMAGE_SUFFIX));
    }
}
