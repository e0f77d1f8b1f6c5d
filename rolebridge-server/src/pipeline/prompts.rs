//! Prompt templates
//!
//! One immutable system prompt per (direction, stage). Analysis prompts pin
//! the model to a single JSON object; synthesis and direct prompts pin it to
//! a Markdown skeleton that depends on the direction.

use rolebridge_common::{Stage, TranslationDirection};

/// AnalysisResult schema shown to the model, with the direction echo filled in
macro_rules! analysis_schema {
    ($direction:literal) => {
        concat!(
            "{\n",
            "  \"direction\": \"", $direction, "\",\n",
            "  \"intent\": \"one-sentence summary of what the author wants\",\n",
            "  \"confidenceScore\": 0.0,\n",
            "  \"structuredData\": {\n",
            "    \"logicCore\": \"the core logic or claim\",\n",
            "    \"constraints\": [\"explicit or implied constraint\"],\n",
            "    \"techContext\": [\"relevant system, data or technology\"]\n",
            "  },\n",
            "  \"missingInfo\": [\n",
            "    {\n",
            "      \"id\": \"Q1\",\n",
            "      \"priority\": \"HIGH\",\n",
            "      \"question\": \"question for the author\",\n",
            "      \"reason\": \"why the answer changes the result\",\n",
            "      \"options\": [\"likely answer\", \"another likely answer\"],\n",
            "      \"defaultAssumption\": \"what to assume when no answer is given\"\n",
            "    }\n",
            "  ],\n",
            "  \"canProceedDirectly\": false\n",
            "}"
        )
    };
}

/// Rules shared by both analysis prompts
macro_rules! analysis_rules {
    () => {
        concat!(
            "Rules:\n",
            "- Output exactly one JSON object matching the schema above. No prose, no Markdown, no code fences.\n",
            "- confidenceScore is a number between 0 and 1 describing how completely the input specifies what is needed.\n",
            "- If confidenceScore is below 0.7, canProceedDirectly MUST be false.\n",
            "- missingInfo holds at most 3 entries, sorted HIGH before MEDIUM.\n",
            "- Every entry needs a unique id (Q1, Q2, Q3) and a concrete defaultAssumption; never leave it empty.\n",
            "- options may be an empty array when the answer is open-ended.\n",
            "- Only ask about gaps that materially change the outcome. When nothing is missing, return an empty missingInfo and set canProceedDirectly to true.\n",
            "- Write all free-text values in the language of the input.\n"
        )
    };
}

const PM_TO_DEV_ANALYSIS: &str = concat!(
    "You analyse requests written by product managers before they are handed to engineers.\n",
    "Identify the intent, the business logic, and the information an engineer would need but cannot find in the text ",
    "(data volume, concurrency, latency, permissions, edge cases, integrations).\n\n",
    "Respond with JSON in this shape:\n",
    analysis_schema!("pm-to-dev"),
    "\n\n",
    analysis_rules!()
);

const DEV_TO_PM_ANALYSIS: &str = concat!(
    "You analyse technical updates written by engineers before they are explained to product managers and business stakeholders.\n",
    "Identify the change, its technical substance, and the business facts needed to explain its value but missing from the text ",
    "(affected users, business metrics, cost, timing, risk).\n\n",
    "Respond with JSON in this shape:\n",
    analysis_schema!("dev-to-pm"),
    "\n\n",
    analysis_rules!()
);

/// Precedence rule for filling gaps, shared by both synthesis prompts
macro_rules! precedence_rules {
    () => {
        concat!(
            "You receive the analysis JSON, the author's answers JSON and the original text.\n",
            "For every missingInfo entry apply exactly this precedence:\n",
            "1. If the answers contain an entry with the same id, use that answer.\n",
            "2. Otherwise use the entry's defaultAssumption, and mark it as an assumption.\n",
            "3. Use the original text only as residual context; it never overrides 1 or 2.\n",
            "Never drop an explicit answer in favour of the default.\n\n"
        )
    };
}

/// Markdown skeleton for documents addressed to engineers
macro_rules! pm_to_dev_skeleton {
    () => {
        concat!(
            "Use this Markdown layout:\n\n",
            "# <headline: the requirement in one line>\n\n",
            "## Message for the engineering team\n",
            "<a copy-ready message addressed to the engineers>\n\n",
            "## Requirement breakdown\n",
            "### Functional scope\n",
            "### Data and interfaces\n",
            "### Performance and capacity\n",
            "### Edge cases and permissions\n",
            "### Assumptions made\n\n",
            "## Effort estimate\n",
            "<rough size per part, with the main risks>\n\n",
            "Omit any sub-section that has nothing relevant in the input; do not invent content to fill the layout.\n",
            "Write in the language of the original text.\n"
        )
    };
}

/// Markdown skeleton for documents addressed to stakeholders
macro_rules! dev_to_pm_skeleton {
    () => {
        concat!(
            "Use this Markdown layout:\n\n",
            "# <headline: the change in business terms>\n\n",
            "## Message for the product team\n",
            "<a copy-ready message addressed to product managers, free of jargon>\n\n",
            "## What changed\n",
            "### User-visible effect\n",
            "### Risks and limitations\n",
            "### Assumptions made\n\n",
            "## Value analysis\n",
            "<impact on users, metrics, cost or schedule>\n\n",
            "Omit any sub-section that has nothing relevant in the input; do not invent content to fill the layout.\n",
            "Write in the language of the original text.\n"
        )
    };
}

const PM_TO_DEV_SYNTHESIS: &str = concat!(
    "You turn a product manager's request into a document engineers can act on.\n\n",
    precedence_rules!(),
    pm_to_dev_skeleton!()
);

const DEV_TO_PM_SYNTHESIS: &str = concat!(
    "You turn an engineer's technical update into a document product managers can act on.\n\n",
    precedence_rules!(),
    dev_to_pm_skeleton!()
);

const PM_TO_DEV_DIRECT: &str = concat!(
    "You turn a product manager's request into a document engineers can act on.\n",
    "Never ask the user questions. Where information is missing, silently apply common industry-standard assumptions ",
    "and list them under \"Assumptions made\".\n\n",
    pm_to_dev_skeleton!()
);

const DEV_TO_PM_DIRECT: &str = concat!(
    "You turn an engineer's technical update into a document product managers can act on.\n",
    "Never ask the user questions. Where information is missing, silently apply common industry-standard assumptions ",
    "and list them under \"Assumptions made\".\n\n",
    dev_to_pm_skeleton!()
);

/// System prompt for a direction and stage
pub fn template(direction: TranslationDirection, stage: Stage) -> &'static str {
    use Stage::*;
    use TranslationDirection::*;

    match (direction, stage) {
        (ForwardToImplementer, Analysis) => PM_TO_DEV_ANALYSIS,
        (ForwardToImplementer, Synthesis) => PM_TO_DEV_SYNTHESIS,
        (ForwardToImplementer, Direct) => PM_TO_DEV_DIRECT,
        (ReverseToStakeholder, Analysis) => DEV_TO_PM_ANALYSIS,
        (ReverseToStakeholder, Synthesis) => DEV_TO_PM_SYNTHESIS,
        (ReverseToStakeholder, Direct) => DEV_TO_PM_DIRECT,
    }
}
