/// System prompt for per-fragment entity extraction. The model must answer
/// with a bare JSON array of `{title, description}` objects.
pub const DEFAULT_ENTITY_EXTRACTION_PROMPT: &str = "\
You extract named entities from a passage of text.

Identify the distinct entities (people, organizations, places, products,
concepts) the passage is about. For each entity produce a short descriptive
sentence grounded in the passage.

Respond with a JSON array and nothing else:
[{\"title\": \"<entity name>\", \"description\": \"<one sentence>\"}]

Skip pronouns and generic terms. Use the surface form from the text as the
title.";

/// System prompt for batch relationship extraction. The user message carries
/// a JSON object with the known entities and the merged passage text.
pub const DEFAULT_RELATIONSHIP_EXTRACTION_PROMPT: &str = "\
You extract relationships between known entities from a passage of text.

The user message is a JSON object with two fields: \"entities\", the entities
already identified in this passage, and \"text\", the passage itself. Find
directed relationships between pairs of those entities that the text states
or strongly implies.

Respond with a JSON array and nothing else:
[{\"source\": \"<entity title>\", \"target\": \"<entity title>\", \
\"description\": \"<one sentence>\", \"strength\": <1-10 integer>}]

Use only entity titles from the provided list. Strength reflects how
explicitly the text supports the relationship.";
