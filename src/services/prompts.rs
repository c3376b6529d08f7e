//! Fixed prompt text, placeholders and diagnostics shown to the learner.

use crate::error::ServiceError;
use crate::models::{AIResponse, Language, QuizOption, QuizSpec};

pub const TEXT_SYSTEM_PROMPT: &str = r#"You are NeuroLens, an advanced AI learning assistant. Your role is to:
1. Provide clear, accurate, and comprehensive explanations
2. Break down complex topics into understandable parts
3. Use examples and analogies when helpful
4. Highlight key concepts with **bold** formatting
5. Structure your response with proper markdown formatting

After your explanation, generate a relevant multiple-choice quiz question to test understanding.

Format your response as JSON with this structure:
{
  "explanation": "Your detailed explanation here with markdown formatting",
  "quiz": {
    "question": "A relevant question to test understanding",
    "options": [
      {"id": "a", "text": "First option"},
      {"id": "b", "text": "Second option"},
      {"id": "c", "text": "Third option"},
      {"id": "d", "text": "Fourth option"}
    ],
    "correctAnswer": "a"
  }
}"#;

pub const IMAGE_SYSTEM_PROMPT: &str = "You are NeuroLens, an AI learning assistant analyzing educational content. Analyze the image and:
1. Describe what you see
2. Explain key concepts shown
3. Provide educational insights
4. Generate a relevant quiz question

Format as JSON with explanation and quiz fields.";

pub const IMAGE_INSTRUCTION: &str =
    "Please analyze this educational content and explain what it teaches.";

pub const CHAT_SYSTEM_PROMPT: &str = r#"You are NeuroLens, a futuristic AI tutor. Provide accurate, clear, and educational answers to any user input.

Rules:
1. Give 100% correct answers.
2. If text question: give step-by-step explanation and optional 1–2 practice questions.
3. If scanned document/image: analyze text/diagram, summarize content, highlight key points.
4. Use bullet points for clarity.
5. Keep answers concise and educational.
6. Remember user context for follow-up questions.
7. Highlight key terms in **bold**.
8. Friendly, professional, cyberpunk futuristic tutor vibe.

Example format:
- Main concept: **Key term explanation**
- Step-by-step:
   1. First point
   2. Second point
   3. Third point
- Example: Real-world application
- Practice question: "Test understanding question?""#;

pub const CHAT_PLACEHOLDER: &str = "**NeuroLens AI Tutor**\n\nPlease add your OpenAI API key in settings to enable the AI chatbot, or ensure the backend server is running at http://localhost:8000";

pub const EMPTY_REPLY: &str = "No response generated.";

/// Appends the answer-language instruction, if the language needs one.
pub fn localized(prompt: &str, language: Language) -> String {
    match language {
        Language::English => prompt.to_string(),
        Language::Georgian => format!(
            "{}\n\nAlways answer in Georgian (ქართული). Keep any JSON keys in English.",
            prompt
        ),
    }
}

pub fn text_placeholder(question: &str) -> AIResponse {
    AIResponse {
        explanation: format!(
            "**Understanding Your Question**\n\nYou asked: \"{}\"\n\nThis is a placeholder response. To get real AI-powered answers, please add your OpenAI API key in the settings.\n\n**How to add your API key:**\n1. Click the settings icon in the navigation bar\n2. Enter your OpenAI API key\n3. Ask your question again\n\nOnce configured, NeuroLens will provide detailed, accurate explanations powered by GPT-4.",
            question
        ),
        quiz: Some(QuizSpec {
            question: "What do you need to enable AI-powered responses?".to_string(),
            options: vec![
                option("a", "An OpenAI API key"),
                option("b", "A premium subscription"),
                option("c", "Special hardware"),
                option("d", "Nothing, it works automatically"),
            ],
            correct_answer: "a".to_string(),
        }),
    }
}

pub fn image_placeholder(file_name: &str) -> AIResponse {
    AIResponse::plain(format!(
        "**Image Analysis**\n\nYou uploaded: {}\n\nTo analyze images with AI, please add your OpenAI API key in the settings. Once configured, NeuroLens will:\n\n- Extract text from images\n- Explain diagrams and charts\n- Answer questions about visual content\n- Generate practice questions based on the image",
        file_name
    ))
}

pub fn text_diagnostic(err: &ServiceError) -> String {
    format!(
        "**Error Processing Request**\n\nThere was an issue connecting to the AI service. Please check:\n\n- Your API key is valid\n- You have sufficient API credits\n- Your internet connection is stable\n\nError details: {}",
        err
    )
}

pub fn image_diagnostic(err: &ServiceError) -> String {
    format!(
        "**Error Analyzing Image**\n\nCouldn't process the image. This might be because:\n\n- The API key doesn't have access to vision models\n- The image format is not supported\n- There was a network issue\n\nError: {}",
        err
    )
}

pub fn chat_diagnostic(err: &ServiceError) -> String {
    format!("**Error**\n\nFailed to get response: {}", err)
}

fn option(id: &str, text: &str) -> QuizOption {
    QuizOption {
        id: id.to_string(),
        text: text.to_string(),
    }
}
