use crate::parser::{NO_MATCHES_SENTINEL, SEPARATOR};

pub struct PromptParams<'a> {
    pub location_query: &'a str,
    pub cuisine: &'a str,
    pub exclude_names: &'a [String],
    pub radius: &'a str,
}

/// Compose the instruction text for one generation call.
///
/// Pure string construction: the same params and session token always yield
/// the same prompt. The session token itself carries no meaning, it only
/// nudges the model away from cached/repeated answers.
pub fn build_prompt(params: &PromptParams, session_token: &str) -> String {
    let cuisine_instruction = if !params.cuisine.is_empty() && params.cuisine != "Any" {
        format!(
            "STRICTLY find \"{}\" restaurants. If 0 found, return \"{NO_MATCHES_SENTINEL}\".",
            params.cuisine
        )
    } else {
        "Find 3 distinct places (mix of styles). Randomize the selection.".to_string()
    };

    let exclude_instruction = if params.exclude_names.is_empty() {
        String::new()
    } else {
        format!(
            "EXCLUDE these names strictly: {}.",
            params.exclude_names.join(", ")
        )
    };

    format!(
        "Session ID: {session_token}\n\
         Act as a restaurant picker engine.\n\
         Search within {radius} miles of \"{location}\".\n\
         \n\
         CRITICAL INSTRUCTION: High randomness required.\n\
         - Do NOT just pick the top rated result every time.\n\
         - Do NOT just pick the closest result every time.\n\
         - You MUST pick 3 different places.\n\
         - Dig deeper into the search results to find variety.\n\
         \n\
         {cuisine_instruction}\n\
         {exclude_instruction}\n\
         \n\
         Return up to 3 results.\n\
         \n\
         Output format per restaurant (Use \"{SEPARATOR}\" between items):\n\
         Name: [Exact Name]\n\
         Cuisine: [Short Type]\n\
         Address: [Short Address]\n\
         Rating: [Number]\n\
         Status: [Open/Closed]\n\
         Reason: [Max 10 words punchy reason]\n\
         \n\
         Example:\n\
         Name: Joe's Pizza\n\
         Cuisine: Pizza\n\
         Address: 123 Main\n\
         Rating: 4.5\n\
         Status: Open\n\
         Reason: Best deep dish in town, super cheesy.\n\
         {SEPARATOR}\n",
        radius = params.radius,
        location = params.location_query,
    )
}

#[test]
fn test_prompt_is_deterministic_for_same_inputs() {
    let params = PromptParams {
        location_query: "Austin, TX",
        cuisine: "Any",
        exclude_names: &[],
        radius: "15",
    };

    assert_eq!(build_prompt(&params, "seed-1"), build_prompt(&params, "seed-1"));
    assert!(build_prompt(&params, "seed-1").contains("Session ID: seed-1"));
}

#[test]
fn test_specific_cuisine_gets_strict_filter_and_sentinel() {
    let params = PromptParams {
        location_query: "Austin, TX",
        cuisine: "Mexican",
        exclude_names: &[],
        radius: "15",
    };

    let prompt = build_prompt(&params, "s");
    assert!(prompt.contains("STRICTLY find \"Mexican\" restaurants"));
    assert!(prompt.contains(NO_MATCHES_SENTINEL));
}

#[test]
fn test_any_cuisine_asks_for_variety_instead() {
    let params = PromptParams {
        location_query: "Austin, TX",
        cuisine: "Any",
        exclude_names: &[],
        radius: "15",
    };

    let prompt = build_prompt(&params, "s");
    assert!(prompt.contains("Find 3 distinct places"));
    assert!(!prompt.contains("STRICTLY find"));
}

#[test]
fn test_exclusions_are_listed_when_present() {
    let excludes = vec!["Joe's Pizza".to_string(), "Thai Palace".to_string()];
    let params = PromptParams {
        location_query: "Austin, TX",
        cuisine: "Any",
        exclude_names: &excludes,
        radius: "5",
    };

    let prompt = build_prompt(&params, "s");
    assert!(prompt.contains("EXCLUDE these names strictly: Joe's Pizza, Thai Palace."));
    assert!(prompt.contains("Search within 5 miles of \"Austin, TX\""));

    let without = build_prompt(
        &PromptParams {
            exclude_names: &[],
            ..params
        },
        "s",
    );
    assert!(!without.contains("EXCLUDE"));
}
