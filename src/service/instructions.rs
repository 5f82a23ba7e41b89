//! Instruction text sent to the model for each transformation mode.

use crate::schema::{
    Choice, GenerateRequest, ImagePromptRequest, OptimizeRequest, RegenerateRequest,
};

pub const OPTIMIZE_SYSTEM: &str = r#"You are an expert prompt engineer. Your task is to optimize prompts to be:
1. Clear and specific
2. Well-structured
3. Action-oriented
4. Ready to copy and paste
5. Free of unnecessary elements

Return the response in this exact JSON format:
{
  "text": "optimized prompt here",
  "structure": {
    "context": "brief context section",
    "task": "clear task definition",
    "format": "expected output format",
    "examples": "any examples if needed"
  },
  "improvements": ["list of improvements made"]
}"#;

pub const GENERATE_SYSTEM: &str = r#"You are an expert prompt engineer. Create a high-quality prompt based on user requirements.

Return the response in this exact JSON format:
{
  "text": "generated prompt here",
  "structure": {
    "context": "context section",
    "task": "task definition",
    "format": "output format",
    "examples": "examples if applicable"
  },
  "suggestions": ["list of usage suggestions"]
}"#;

pub const REGENERATE_SYSTEM: &str = r#"You are an expert prompt engineer. Create 3 different variations of the given prompt.

Return the response in this exact JSON format:
[
  {
    "text": "variation 1 here",
    "structure": {
      "context": "context section",
      "task": "task definition",
      "format": "output format",
      "examples": "examples if applicable"
    }
  },
  {
    "text": "variation 2 here",
    "structure": {
      "context": "context section",
      "task": "task definition",
      "format": "output format",
      "examples": "examples if applicable"
    }
  },
  {
    "text": "variation 3 here",
    "structure": {
      "context": "context section",
      "task": "task definition",
      "format": "output format",
      "examples": "examples if applicable"
    }
  }
]"#;

pub const IMAGE_SYSTEM: &str = r#"You are an expert AI image prompt generator. Generate a detailed, professional image generation prompt in a SINGLE COMPREHENSIVE PARAGRAPH format.

Use the P.R.O C.A.M.E.R.A framework principles internally (Photography Type, Realism Level, Objects & Subjects, Colors & Palette, Atmosphere & Mood, Medium & Style, Environment & Setting, Resolution & Quality, Artistic Influences) but DO NOT mention the framework or list these elements separately.

CRITICAL REQUIREMENTS:
1. Write as ONE flowing paragraph (not a list or sections)
2. ALWAYS include "High resolution 8k" in the prompt
3. Make it concise yet comprehensive (2-4 sentences maximum)
4. Include all framework elements naturally woven into the description
5. Make it vivid, detailed, and ready to use in any AI image generator
6. Automatically enhance the prompt with relevant artistic details, lighting, composition, and quality descriptors

Generate a professional, enhanced prompt based on the user's topic."#;

pub fn optimize_user(req: &OptimizeRequest) -> String {
    format!(
        "Optimize this {} prompt for {} use at {} complexity level:\n\n\"{}\"\n\nMake it structured, clean, and ready to copy-paste. Remove any unnecessary elements.",
        req.prompt_type.as_str(),
        req.category.as_str(),
        req.complexity.as_str(),
        req.prompt
    )
}

pub fn generate_user(req: &GenerateRequest) -> String {
    format!(
        "Generate a {} {} prompt based on these requirements:\n\n\"{}\"\n\nMake it structured, clear, and ready to copy-paste.",
        req.complexity.as_str(),
        req.category.as_str(),
        req.requirements
    )
}

pub fn regenerate_user(req: &RegenerateRequest) -> String {
    format!(
        "Create 3 different {} variations of this {} {} prompt:\n\n\"{}\"\n\nMake each variation unique but structured and copy-ready.",
        req.complexity.as_str(),
        req.category.as_str(),
        req.prompt_type.as_str(),
        req.prompt
    )
}

pub fn image_user(req: &ImagePromptRequest) -> String {
    format!("Generate a detailed image prompt for: {}", req.topic)
}
