/// One selectable polaroid style.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PromptOption {
    pub id: &'static str,
    pub label: &'static str,
    pub prompt: &'static str,
}

pub const PROMPT_OPTIONS: &[PromptOption] = &[
    PromptOption {
        id: "portrait",
        label: "Portrait",
        prompt: "a polaroid photo of the two people with a white curtain background, no props, slight blur, and a soft flash light source",
    },
    PromptOption {
        id: "high-five",
        label: "High Five",
        prompt: "a polaroid photo of the two people high-fiving each other with a white curtain background, soft light, slightly blurred",
    },
    PromptOption {
        id: "hug",
        label: "Hug",
        prompt: "a polaroid photo of the two people hugging with a white curtain background, soft light, slightly blurred",
    },
];

pub fn find_prompt(id: &str) -> Option<&'static PromptOption> {
    let needle = id.trim();
    PROMPT_OPTIONS.iter().find(|option| option.id == needle)
}

pub fn prompt_ids() -> Vec<&'static str> {
    PROMPT_OPTIONS.iter().map(|option| option.id).collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::{find_prompt, prompt_ids, PROMPT_OPTIONS};

    #[test]
    fn catalog_ids_are_unique() {
        let ids: HashSet<&str> = PROMPT_OPTIONS.iter().map(|option| option.id).collect();
        assert_eq!(ids.len(), PROMPT_OPTIONS.len());
    }

    #[test]
    fn find_prompt_trims_and_matches_exact_id() {
        assert_eq!(find_prompt(" hug ").map(|option| option.label), Some("Hug"));
        assert!(find_prompt("Hug").is_none());
        assert!(find_prompt("missing").is_none());
    }

    #[test]
    fn prompt_ids_follow_catalog_order() {
        assert_eq!(prompt_ids(), vec!["portrait", "high-five", "hug"]);
    }
}
