//! Read-only catalog of starter prompts, grouped by category.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::schema::Category;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Template {
    pub name: &'static str,
    pub prompt: &'static str,
}

/// Serializes as `{"creative": [...], "technical": [...], ...}`.
pub type TemplateCatalog = BTreeMap<Category, Vec<Template>>;

static CATALOG: Lazy<TemplateCatalog> = Lazy::new(|| {
    Category::ALL
        .iter()
        .map(|category| (*category, templates_for(*category)))
        .collect()
});

/// The catalog. Built once, identical for the life of the process.
pub fn list() -> &'static TemplateCatalog {
    &CATALOG
}

fn templates_for(category: Category) -> Vec<Template> {
    match category {
        Category::Creative => vec![
            Template {
                name: "Story Writing",
                prompt: "Write a compelling story about [TOPIC]. Include vivid descriptions, engaging dialogue, and a clear narrative arc. The story should be [LENGTH] and targeted at [AUDIENCE].",
            },
            Template {
                name: "Creative Brainstorming",
                prompt: "Generate creative ideas for [PROJECT/TOPIC]. Think outside the box and provide at least 5 unique concepts with brief explanations for each.",
            },
        ],
        Category::Technical => vec![
            Template {
                name: "Code Review",
                prompt: "Review the following code for best practices, performance, and security issues. Provide specific suggestions for improvement:\n\n[CODE]",
            },
            Template {
                name: "Technical Documentation",
                prompt: "Create comprehensive technical documentation for [SYSTEM/API]. Include setup instructions, usage examples, and troubleshooting guide.",
            },
        ],
        Category::Business => vec![
            Template {
                name: "Business Strategy",
                prompt: "Develop a business strategy for [COMPANY/PRODUCT]. Analyze market opportunities, competitive landscape, and provide actionable recommendations.",
            },
            Template {
                name: "Marketing Content",
                prompt: "Create engaging marketing content for [PRODUCT/SERVICE]. The content should highlight key benefits, target [AUDIENCE], and include a clear call-to-action.",
            },
        ],
        Category::Educational => vec![
            Template {
                name: "Lesson Plan",
                prompt: "Create a detailed lesson plan for teaching [SUBJECT] to [GRADE LEVEL]. Include learning objectives, activities, and assessment methods.",
            },
            Template {
                name: "Explanation",
                prompt: "Explain [CONCEPT] in simple terms suitable for [AUDIENCE]. Use examples and analogies to make it easy to understand.",
            },
        ],
        Category::General => vec![
            Template {
                name: "Problem Solving",
                prompt: "Help me solve this problem: [PROBLEM]. Provide a step-by-step approach and consider multiple solutions.",
            },
            Template {
                name: "Analysis",
                prompt: "Analyze [TOPIC] from multiple perspectives. Consider pros and cons, implications, and provide a balanced conclusion.",
            },
        ],
    }
}
