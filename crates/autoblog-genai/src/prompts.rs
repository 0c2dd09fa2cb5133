//! Prompt templates.

use autoblog_types::GenerationSettings;

/// Categories the writer may classify an article into.
pub const CATEGORIES: &[&str] = &[
    "التكنولوجيا",
    "الذكاء الاصطناعي",
    "الاقتصاد",
    "الصحة",
    "نمط الحياة",
    "عام",
];

/// Appended when the search tool is unavailable.
pub const NO_SEARCH_NOTE: &str =
    "\n(Note: Generate based on your internal knowledge base as search is unavailable.)";

pub fn topic_prompt(settings: &GenerationSettings) -> String {
    format!(
        r#"Act as a professional SEO trend analyst.
Analyze current trends related to the niche: "{niche}".
You MUST incorporate insights from the following specific keywords: "{keywords}".

Task:
1. Identify a specific, high-engagement trending topic suitable for a long-form blog post.
2. Provide a brief analysis (2-3 sentences) explaining why this topic is trending.

Output Language: {language}.

Return RAW JSON only, shaped as: {{ "topic": "...", "analysis": "..." }}"#,
        niche = settings.niche,
        keywords = settings.keywords,
        language = settings.language,
    )
}

pub fn article_prompt(topic: &str, settings: &GenerationSettings) -> String {
    format!(
        r#"Write a comprehensive, professional blog post about: "{topic}".

Requirements:
1. Language: {language}.
2. Tone: professional, engaging and authoritative.
3. Format the body as HTML. Do NOT use <h1>; the title is the page heading. Start at <h2>, use <ul>/<li> for lists and <p> for paragraphs.
4. Long-form and detailed (at least 800 words).
5. Include a short meta-description style excerpt and 3-5 relevant tags.
6. Classify the article into exactly one of: {categories}.
7. Write a detailed image generation prompt IN ENGLISH that depicts this article, in this style: "{style}".

Return RAW JSON only, without markdown fences, with newlines inside strings escaped:
{{
  "title": "...",
  "content": "<h2>...</h2><p>...</p>",
  "excerpt": "...",
  "tags": ["..."],
  "category": "...",
  "imagePrompt": "..."
}}"#,
        language = settings.language,
        categories = CATEGORIES.join(", "),
        style = settings.image_style,
    )
}
