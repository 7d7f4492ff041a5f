//! Prompt text for each generation profile.

use std::fmt::Write as _;

use seoforge_shared::Brief;

use crate::generation::{GenerationProfile, GenerationRequest};
use crate::stage::StageInput;

/// Inputs larger than this are cut before being placed in a prompt.
const MAX_INPUT_CHARS: usize = 60_000;

fn institution(brief: Option<&Brief>) -> &str {
    brief
        .map(|b| b.institution_name.trim())
        .filter(|n| !n.is_empty())
        .unwrap_or("the institution")
}

/// System prompt establishing the persona for a profile.
pub fn system_prompt(profile: GenerationProfile, brief: Option<&Brief>) -> String {
    let name = institution(brief);
    match profile {
        GenerationProfile::RankingAnalyst => format!(
            "You are a senior SEO data analyst working for {name}. You read keyword \
             ranking data and explain, in plain business language, where {name} is \
             gaining ground, where competitors are ahead, and which keywords deserve \
             investment."
        ),
        GenerationProfile::AdCopywriter => format!(
            "You are a search advertising copywriter for {name}. You write concise, \
             compliant ad copy that matches search intent and stays factual."
        ),
        GenerationProfile::OutlineStrategist => format!(
            "You are a content strategist for {name}. You plan blog posts that rank \
             for target keywords and support the institution's ad campaigns."
        ),
        GenerationProfile::Researcher => format!(
            "You are a research assistant for the content team at {name}. You use web \
             search to gather current, verifiable facts and cite where each fact came from."
        ),
        GenerationProfile::BlogWriter => {
            format!("You are an expert SEO content writer for {name}.")
        }
    }
}

fn task_instructions(profile: GenerationProfile, brief: Option<&Brief>) -> String {
    let name = institution(brief);
    match profile {
        GenerationProfile::RankingAnalyst => format!(
            "Analyze the ranking data below for {name} and its top competitors.\n\n\
             Cover:\n\
             1. Keywords where {name} recently started ranking, with rank and search volume\n\
             2. Keywords competitors rank for that {name} does not\n\
             3. Low-difficulty, high-volume opportunities\n\
             4. A prioritized list of recommended target keywords with reasons\n\n\
             Use Markdown headings and tables. Do not invent numbers that are not in the data."
        ),
        GenerationProfile::AdCopywriter => format!(
            "Write search ad copy for {name} for each selected keyword below.\n\n\
             For every keyword give three variants, each with:\n\
             - Headline (max 30 characters)\n\
             - Description (max 90 characters)\n\
             - Call to action\n\n\
             Group the variants under a heading per keyword. Keep claims factual and do \
             not mention other institutions."
        ),
        GenerationProfile::OutlineStrategist => format!(
            "Using the selected keywords and the ad copies below, propose blog post \
             outlines for {name}, one per keyword.\n\n\
             Each outline must include a working title, the target keyword, a suggested \
             word count, a meta description, and H2/H3 sections with bullet points \
             describing what each section covers. Keep the messaging consistent with \
             the ad copies."
        ),
        GenerationProfile::Researcher => format!(
            "Research the topic of the blog outline below for {name}.\n\n\
             Search the web for recent statistics, program facts, and trends relevant to \
             each section. Report your findings as Markdown notes grouped by outline \
             section, each fact followed by its source URL. Do not write the blog post."
        ),
        GenerationProfile::BlogWriter => format!(
            "Write a detailed blog post based on the outline below.\n\n\
             Follow these guidelines:\n\
             1. Write in a professional, authoritative tone\n\
             2. Use proper Markdown formatting with headers and lists\n\
             3. Stay within the specified word count\n\
             4. Naturally incorporate the target keyword and its variations\n\
             5. Focus on providing value and establishing {name}'s expertise\n\
             6. Include relevant examples and actionable insights\n\
             7. Follow the exact structure from the outline\n\
             8. Keep content factual and avoid controversial topics\n\
             9. Do not compare with or mention other institutions\n\
             10. Write a compelling meta description\n\
             11. Meet experience, expertise, authoritativeness and trustworthiness guidelines\n\
             12. If research notes are provided, prefer their facts and keep their sources\n\n\
             Format the output as:\n\
             # [Blog Title]\n\n\
             **Meta Description**: [meta description]\n\
             **Target Keyword**: [keyword]\n\
             **Word Count**: [actual word count]\n\n\
             [Complete blog post content in Markdown]"
        ),
    }
}

fn truncate(content: &str) -> &str {
    if content.len() <= MAX_INPUT_CHARS {
        return content;
    }
    let mut end = MAX_INPUT_CHARS;
    while !content.is_char_boundary(end) {
        end -= 1;
    }
    &content[..end]
}

/// User prompt: task instructions, the brief, then each input as a section.
pub fn user_prompt(request: &GenerationRequest<'_>) -> String {
    let mut prompt = task_instructions(request.profile, request.brief);

    if let Some(brief) = request.brief {
        let _ = write!(prompt, "\n\nInstitution: {}", brief.institution_name.trim());
        if !brief.domain.trim().is_empty() {
            let _ = write!(prompt, "\nWebsite: {}", brief.domain.trim());
        }
    }

    for input in request.inputs {
        let body = truncate(&input.content);
        let fence = matches!(
            input.input,
            StageInput::OwnRankings | StageInput::CompetitorRankings | StageInput::KeywordSelection
        );
        let _ = write!(prompt, "\n\n## {}\n\n", input.input.label());
        if fence {
            let _ = write!(prompt, "```json\n{body}\n```");
        } else {
            prompt.push_str(body);
        }
        if body.len() < input.content.len() {
            prompt.push_str("\n\n[... truncated ...]");
        }
    }

    prompt
}
