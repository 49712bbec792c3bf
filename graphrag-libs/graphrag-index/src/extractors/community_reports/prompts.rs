pub const COMMUNITY_REPORT_PROMPT: &str = r#"
You are an analyst writing a report about a community of related entities in a knowledge graph.

# Goal
Write a report describing the community: its key entities, how they relate, and the claims made about them. The report informs decision makers about what matters in this community and how significant it is.

# Report Structure
Return a single JSON object with the following fields:
- title: a short, specific name for the community that mentions its key entities.
- summary: an executive summary of the community's structure and notable information.
- rating: a float between 0 and 10 scoring the importance of the community.
- rating_explanation: one sentence explaining the rating.
- findings: a list of 5-10 objects, each with a "summary" (one line insight) and an "explanation" (several paragraphs grounded in the data).

{
    "title": <report_title>,
    "summary": <executive_summary>,
    "rating": <importance_rating>,
    "rating_explanation": <rating_explanation>,
    "findings": [
        {
            "summary": <insight_1_summary>,
            "explanation": <insight_1_explanation>
        }
    ]
}

Do not include information for which no supporting evidence is provided in the data.
Limit the report to {max_report_length} words.

# Data
{input_text}

Output:"#;

pub const CONTINUE_PROMPT: &str =
    "The output was cut off. Continue exactly where it stopped, without repeating anything already written.";

pub const GLEANING_PROMPT: &str = r#"The previous output was not a valid report. Return only the complete JSON object with the fields "title", "summary", "rating", "rating_explanation" and "findings"."#;
