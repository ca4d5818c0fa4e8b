//! Attribute vocabulary shared by understanding, scoring, validation and narrowing.
//!
//! Each attribute has a list of [`TermGroup`]s: a display label plus the
//! surface terms that count as a mention of it. Matching is word-bounded and
//! tolerates a trailing plural, so `"mugs of plastics"` mentions `Plastic`
//! but `"glass-ceramics"` does not mention `Ceramic` twice.

/// Canonical attribute keys.
pub mod attr {
    pub const PRODUCT_TYPE: &str = "product_type";
    pub const MATERIAL: &str = "material";
    pub const FUNCTION: &str = "function";
    pub const CONSTRUCTION: &str = "construction";
    pub const AUDIENCE: &str = "audience";
    pub const POWER_SOURCE: &str = "power_source";
}

/// A display label and the terms that mention it.
#[derive(Debug)]
pub struct TermGroup {
    pub label: &'static str,
    pub terms: &'static [&'static str],
}

impl TermGroup {
    /// Whether `text` mentions any of this group's terms.
    pub fn mentioned_in(&self, text: &str) -> bool {
        let words = tokenize(text);
        self.terms.iter().any(|t| words_contain(&words, t))
    }

    /// Whether `value` names this group (its label or one of its terms).
    pub fn names(&self, value: &str) -> bool {
        let v = value.trim().to_lowercase();
        self.label.to_lowercase() == v
            || self.terms.iter().any(|t| *t == v)
            || self.terms.iter().any(|t| contains_phrase(&v, t))
    }
}

pub const MATERIALS: &[TermGroup] = &[
    TermGroup {
        label: "Ceramic",
        terms: &["ceramic", "porcelain", "china", "stoneware", "earthenware"],
    },
    TermGroup {
        label: "Glass",
        terms: &["glass"],
    },
    TermGroup {
        label: "Plastic",
        terms: &["plastic", "polyethylene", "polypropylene", "pvc", "acrylic"],
    },
    TermGroup {
        label: "Rubber",
        terms: &["rubber", "silicone", "latex"],
    },
    TermGroup {
        label: "Steel",
        terms: &["steel", "stainless steel", "iron"],
    },
    TermGroup {
        label: "Aluminum",
        terms: &["aluminum", "aluminium"],
    },
    TermGroup {
        label: "Copper alloy",
        terms: &["copper", "brass", "bronze"],
    },
    TermGroup {
        label: "Precious metal",
        terms: &["gold", "silver", "platinum"],
    },
    TermGroup {
        label: "Wood",
        terms: &["wood", "wooden", "bamboo"],
    },
    TermGroup {
        label: "Paper",
        terms: &["paper", "paperboard", "cardboard"],
    },
    TermGroup {
        label: "Cotton",
        terms: &["cotton"],
    },
    TermGroup {
        label: "Synthetic fiber",
        terms: &["polyester", "nylon", "synthetic fibers", "man-made fibers"],
    },
    TermGroup {
        label: "Wool",
        terms: &["wool"],
    },
    TermGroup {
        label: "Leather",
        terms: &["leather"],
    },
    TermGroup {
        label: "Stone",
        terms: &["stone", "marble", "granite"],
    },
];

pub const CONSTRUCTIONS: &[TermGroup] = &[
    TermGroup {
        label: "Knitted or crocheted",
        terms: &["knitted", "crocheted", "knit"],
    },
    TermGroup {
        label: "Woven",
        terms: &["woven"],
    },
    TermGroup {
        label: "Molded",
        terms: &["molded", "moulded"],
    },
    TermGroup {
        label: "Cast",
        terms: &["cast"],
    },
    TermGroup {
        label: "Forged",
        terms: &["forged"],
    },
];

pub const AUDIENCES: &[TermGroup] = &[
    TermGroup {
        label: "Men or boys",
        terms: &["men", "boys"],
    },
    TermGroup {
        label: "Women or girls",
        terms: &["women", "girls"],
    },
    TermGroup {
        label: "Infants or children",
        terms: &["infants", "babies", "children", "child"],
    },
];

pub const FUNCTIONS: &[TermGroup] = &[
    TermGroup {
        label: "Household or kitchen use",
        terms: &["household", "kitchen", "kitchenware", "tableware", "domestic"],
    },
    TermGroup {
        label: "Industrial use",
        terms: &["industrial", "machinery", "machine"],
    },
    TermGroup {
        label: "Vehicle part",
        terms: &["motor vehicle", "automotive", "vehicle"],
    },
    TermGroup {
        label: "Personal adornment",
        terms: &["jewelry", "jewellery", "adornment"],
    },
    TermGroup {
        label: "Toy or game",
        terms: &["toy", "game"],
    },
];

pub const POWER_SOURCES: &[TermGroup] = &[
    TermGroup {
        label: "Electric",
        terms: &["electric", "electrical", "battery"],
    },
    TermGroup {
        label: "Non-electric",
        terms: &["non-electric", "manual", "hand-operated"],
    },
];

/// Terms that mark a product as worn on the body.
pub const BODY_WORN: TermGroup = TermGroup {
    label: "Worn on the body",
    terms: &[
        "worn", "wearable", "finger", "wrist", "neck", "ear", "ankle", "jewelry", "jewellery",
    ],
};

/// Vocabulary for an attribute key, if one is defined.
pub fn vocabulary(attribute: &str) -> Option<&'static [TermGroup]> {
    match attribute {
        attr::MATERIAL => Some(MATERIALS),
        attr::CONSTRUCTION => Some(CONSTRUCTIONS),
        attr::AUDIENCE => Some(AUDIENCES),
        attr::FUNCTION => Some(FUNCTIONS),
        attr::POWER_SOURCE => Some(POWER_SOURCES),
        _ => None,
    }
}

/// The group an answer value belongs to, if any.
pub fn group_for(attribute: &str, value: &str) -> Option<&'static TermGroup> {
    vocabulary(attribute)?.iter().find(|g| g.names(value))
}

/// Groups of `groups` mentioned in `text`, in table order.
pub fn groups_in<'a>(text: &str, groups: &'a [TermGroup]) -> Vec<&'a TermGroup> {
    let words = tokenize(text);
    groups
        .iter()
        .filter(|g| g.terms.iter().any(|t| words_contain(&words, t)))
        .collect()
}

/// Lowercase alphanumeric words of `text`.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

/// Word-bounded, plural-tolerant phrase match.
pub fn contains_phrase(text: &str, phrase: &str) -> bool {
    words_contain(&tokenize(text), phrase)
}

fn words_contain(words: &[String], phrase: &str) -> bool {
    let needle = tokenize(phrase);
    if needle.is_empty() || needle.len() > words.len() {
        return false;
    }
    words
        .windows(needle.len())
        .any(|w| w.iter().zip(&needle).all(|(word, n)| word_matches(word, n)))
}

fn word_matches(word: &str, term: &str) -> bool {
    word == term
        || word
            .strip_prefix(term)
            .is_some_and(|rest| rest == "s" || rest == "es")
}

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "from", "into", "onto", "other", "than", "that", "this", "are",
    "was", "its", "not", "but", "has", "have", "all", "any", "kind", "used", "use", "made", "per",
    "each", "such", "thereof", "including", "whether", "or", "of", "on", "in", "a", "an", "to",
];

/// Search keywords from free text: lowercased, stopwords dropped, singularized, deduplicated.
pub fn keywords(text: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for word in tokenize(text) {
        if word.len() < 3 || STOPWORDS.contains(&word.as_str()) || word.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        let singular = singularize(&word);
        if !out.contains(&singular) {
            out.push(singular);
        }
    }
    out
}

fn singularize(word: &str) -> String {
    if word.len() <= 3 {
        return word.to_string();
    }
    if let Some(stem) = word.strip_suffix("ies") {
        return format!("{stem}y");
    }
    for suffix in ["sses", "shes", "ches", "xes"] {
        if word.ends_with(suffix) {
            return word[..word.len() - 2].to_string();
        }
    }
    if word.ends_with("ss") || word.ends_with("us") {
        return word.to_string();
    }
    word.strip_suffix('s').unwrap_or(word).to_string()
}
