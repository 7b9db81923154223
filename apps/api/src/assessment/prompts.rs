// Competency extraction prompt templates.

pub const EXTRACTION_SYSTEM: &str = "\
You are an expert skills assessment analyst for product managers. \
You read one work artifact and report which skills it demonstrates, at what level. \
You MUST respond with valid JSON only, without markdown fences or explanations. \
Only use skill ids and levels from the taxonomy you are given. \
Never report a skill the artifact does not actually show evidence for.";

pub const EXTRACTION_PROMPT: &str = r#"Identify the skills demonstrated in the work artifact below.

SKILLS TAXONOMY (id, name, category, ordered levels lowest to highest):
{taxonomy}

WORK ARTIFACT ({artifact_id}):
{artifact_text}

OUTPUT SCHEMA (return exactly this structure):
{
  "observations": [
    {
      "skill_id": "one of the taxonomy ids above",
      "level": "one of that skill's levels",
      "confidence": 0.0,
      "evidence_text": "short quote or paraphrase from the artifact"
    }
  ]
}

RULES:
- confidence is between 0.0 and 1.0 and reflects how clearly the artifact shows the level.
- Report at most one observation per skill: the highest level the artifact supports.
- If the artifact shows no skill from the taxonomy, return {"observations": []}.
"#;
