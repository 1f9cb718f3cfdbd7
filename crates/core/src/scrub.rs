//! Identity-leakage scrubber.
//!
//! Identity reaches the image model through the reference image only, so
//! any text describing hair, eyes, skin, facial structure, ethnicity, age
//! or identifying accessories is deleted before a prompt is stored. The
//! battery is an ordered table of declarative rules; [`scrub`] applies the
//! whole table followed by a punctuation cleanup pass, repeating until the
//! text stops changing so that `scrub(scrub(x)) == scrub(x)`.
//!
//! Body, wardrobe and realism text is never a target: a phrase only goes
//! when its words come from the appearance vocabulary below. Connectors
//! such as "with a" are dropped only when they sit directly in front of
//! removed text.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

// ---------------------------------------------------------------------------
// Vocabulary
// ---------------------------------------------------------------------------

/// Person nouns that identity-carrier constructions hang off.
const PERSON: &str = "women|woman|men|man|girls|girl|boys|boy|ladies|lady|gentleman|guy|female|male|person|model|subject";

/// Nouns whose presence marks a phrase as describing identity.
const IDENTITY_FEATURE: &str = "hair|eyes|skin|complexion|freckles|features|face|lips|beard|cheekbones|jawline|nose|eyebrows|brows";

const HAIR_COLOR: &str = r"platinum[\s-]blonde|strawberry[\s-]blonde|dirty[\s-]blonde|ash[\s-]blonde|honey[\s-]blonde|jet[\s-]black|blonde|blond|brunette|brown|black|red|auburn|ginger|copper|chestnut|silver|grey|gray|white|golden|honey|raven|dark|light|pink|blue|purple|caramel|mahogany|burgundy";

const HAIR_LENGTH: &str = r"shoulder[\s-]length|medium[\s-]length|waist[\s-]length|chin[\s-]length|long|short|cropped|buzzed";

const HAIR_TEXTURE: &str = r"slicked[\s-]back|tied[\s-]back|curly|wavy|straight|braided|messy|sleek|thick|thin|voluminous|tousled|layered|silky|frizzy|kinky|coily|flowing|loose|shiny";

const EYE_DESCRIPTOR: &str = r"almond[\s-]shaped|deep[\s-]set|wide[\s-]set|amber|blue|green|brown|hazel|grey|gray|dark|light|black|violet|hooded|round|big|large|bright|piercing|sparkling|striking|doe|sultry|expressive";

const SKIN_DESCRIPTOR: &str = r"sun[\s-]kissed|fair|pale|light|dark|olive|tanned|tan|bronzed|bronze|ebony|porcelain|brown|black|white|golden|caramel|ivory|alabaster|freckled|rosy";

const FACE_DESCRIPTOR: &str = r"heart[\s-]shaped|oval|square|angular|delicate|symmetrical|chiseled|sculpted|prominent|high|full|plump|pouty|strong";

const GLASSES_SHAPE: &str = "thick|thin|round|square|oval|black|wire|metal|oversized|small|large";

/// Modifiers that make "glasses" unambiguously eyewear.
const GLASSES_FRAME: &str = r"tortoiseshell|horn[\s-]rimmed|rimless|cat[\s-]eye|reading|prescription|[a-z]+-rimmed|[a-z]+-framed";

const ETHNICITY: &str = r"african[\s-]american|afro[\s-]caribbean|east[\s-]asian|south[\s-]asian|southeast[\s-]asian|middle[\s-]eastern|native[\s-]american|mixed[\s-]race|caucasian|white|black|asian|african|caribbean|latina|latino|latinx|hispanic|arab|persian|european|scandinavian|nordic|slavic|mediterranean|indian|japanese|chinese|korean|vietnamese|thai|filipina|filipino|indonesian|polynesian|indigenous|biracial";

const FRAME_ADJECTIVE: &str = r"plus[\s-]sized?|broad[\s-]shouldered|slim|slender|petite|curvy|athletic|muscular|stocky|tall|short|skinny|voluptuous|thin|chubby|lanky|toned|fit|busty|heavyset";

const ATTRACTIVENESS: &str = "beautiful|pretty|gorgeous|attractive|handsome|stunning|cute|lovely|sexy|hot";

const AGE_ADJECTIVE: &str = r"middle[\s-]aged|young|younger|elderly|old|older|teenage|teen|youthful|mature|adult";

/// Upper bound on full passes; every changing pass shortens or normalises
/// the text, so convergence happens long before this.
const MAX_PASSES: usize = 16;

/// Left behind by identity rules at the point where text was removed, and
/// stripped again before the next rule runs.
const MARK: char = '\u{1f}';

const DELETE: &str = "\u{1f}";

const KEEP_PERSON: &str = "${1}\u{1f}";

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// A single pattern -> replacement rule.
///
/// Most rules delete their match outright. Rules that strip an adjective
/// bound to a person noun keep the noun via a `${1}` replacement.
#[derive(Debug)]
pub struct ScrubRule {
    pub name: &'static str,
    pub regex: Regex,
    replacement: String,
}

impl ScrubRule {
    fn new(name: &'static str, pattern: String, replacement: impl Into<String>) -> Self {
        // Patterns are assembled from the constant vocabulary above.
        let regex = Regex::new(&pattern).expect("valid scrub rule regex");
        Self {
            name,
            regex,
            replacement: replacement.into(),
        }
    }

    /// Apply this rule once over the whole text.
    pub fn apply(&self, text: &str) -> String {
        strip_marks(&self.apply_marked(text))
    }

    /// Whether this rule matches anywhere in `text`.
    pub fn matches(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    fn apply_marked<'t>(&self, text: &'t str) -> Cow<'t, str> {
        self.regex.replace_all(text, self.replacement.as_str())
    }
}

static IDENTITY_RULES: LazyLock<Vec<ScrubRule>> = LazyLock::new(build_identity_rules);

static CLEANUP_RULES: LazyLock<Vec<ScrubRule>> = LazyLock::new(build_cleanup_rules);

/// A connector or article stranded directly in front of removed text.
static DANGLING_CONNECTOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:with|and|a|an|the)(?:\s+(?:a|an|the))?(?:\s*\x{1f})+\s*([,.;]|$)")
        .expect("valid regex")
});

fn build_identity_rules() -> Vec<ScrubRule> {
    let p = PERSON;
    let f = IDENTITY_FEATURE;
    let hc = HAIR_COLOR;
    let hl = HAIR_LENGTH;
    let ht = HAIR_TEXTURE;
    let ed = EYE_DESCRIPTOR;
    let sd = SKIN_DESCRIPTOR;
    let eth = ETHNICITY;
    let glasses_style = format!("{GLASSES_SHAPE}|{GLASSES_FRAME}");

    // Appearance descriptors ending in a feature noun. Any other word, a
    // comma or "and" ends the run, so body and wardrobe text after the
    // person noun is left alone.
    let feature_run = format!(
        r"(?:(?:a|an)\s+)?(?:(?:{hl}|{ht}|{hc}|{ed}|{sd}|{FACE_DESCRIPTOR})[\s-]+){{1,4}}(?:{f})(\s|$|[,.;])"
    );

    vec![
        // -- identity-carrier constructions (run first so the whole clause goes) --
        ScrubRule::new(
            "person_with_identity",
            format!(r"(?i)\b({p})\s+with\s+{feature_run}"),
            "${1}\u{1f}${2}",
        ),
        ScrubRule::new(
            "person_has_identity",
            format!(r"(?i)\b({p})\s+(?:who\s+)?(?:is|has)\s+{feature_run}"),
            "${1}\u{1f}${2}",
        ),
        ScrubRule::new(
            "pronoun_has_identity",
            format!(r"(?i)\b(?:she|he|they)\s+(?:has|have)\s+{feature_run}"),
            "\u{1f}${1}",
        ),
        ScrubRule::new(
            "possessive_feature_is",
            r"(?i)\b(?:her|his|their)\s+(?:hair|eyes|skin(?:\s+tone)?|complexion)\s+(?:is|are)\s+[a-z-]+\b".to_string(),
            DELETE,
        ),
        // -- accessories --
        ScrubRule::new(
            "person_with_glasses",
            format!(r"(?i)\b({p})\s+with\s+(?:a\s+pair\s+of\s+)?(?:(?:{glasses_style})[\s-]+){{0,3}}(?:eye)?glasses\b"),
            KEEP_PERSON,
        ),
        ScrubRule::new(
            "wearing_glasses",
            format!(r"(?i)\bwearing\s+(?:(?:a\s+pair\s+of|her|his|their)\s+)?(?:(?:{glasses_style})[\s-]+){{0,3}}(?:eye)?glasses\b"),
            DELETE,
        ),
        ScrubRule::new(
            "glasses",
            format!(r"(?i)\b(?:(?:{glasses_style})[\s-]+){{0,2}}(?:{GLASSES_FRAME})[\s-]+glasses\b|\beyeglasses\b|\bspectacles\b"),
            DELETE,
        ),
        // -- age --
        ScrubRule::new(
            "age_years_old",
            r"(?i)\b\d{1,3}[\s-]?(?:years?|yrs?)[\s-]?old\b".to_string(),
            DELETE,
        ),
        ScrubRule::new(
            "age_decade",
            r"(?i)\b(?:in\s+)?(?:her|his|their)\s+(?:early|mid|late)?[\s-]*(?:teens|twenties|thirties|forties|fifties|sixties|seventies|eighties|\d0'?s)\b".to_string(),
            DELETE,
        ),
        ScrubRule::new("aged_number", r"(?i)\baged?\s+\d{1,3}\b".to_string(), DELETE),
        ScrubRule::new(
            "age_adjective",
            format!(r"(?i)\b(?:{AGE_ADJECTIVE})\s+({p})\b"),
            KEEP_PERSON,
        ),
        // -- ethnicity --
        ScrubRule::new(
            "ethnicity_before_person",
            format!(r"(?i)\b(?:{eth})\s+({p})\b"),
            KEEP_PERSON,
        ),
        ScrubRule::new(
            "ethnicity_descent",
            r"(?i)\bof\s+(?:[a-z-]+\s+){1,2}(?:descent|heritage|ethnicity|origin)\b".to_string(),
            DELETE,
        ),
        ScrubRule::new(
            "ethnicity_features",
            format!(r"(?i)\b(?:{eth})\s+(?:features|heritage|ethnicity|appearance|descent)\b"),
            DELETE,
        ),
        // -- person-bound adjectives --
        ScrubRule::new(
            "frame_adjective",
            format!(r"(?i)\b(?:{FRAME_ADJECTIVE})\s+({p})\b"),
            KEEP_PERSON,
        ),
        ScrubRule::new(
            "attractiveness",
            format!(r"(?i)\b(?:{ATTRACTIVENESS})\s+({p})\b"),
            KEEP_PERSON,
        ),
        // -- hair --
        ScrubRule::new(
            "hair_phrase",
            format!(r"(?i)\b(?:(?:{hl}|{ht}|{hc})[\s-]+(?:and\s+)?){{1,4}}hair\b"),
            DELETE,
        ),
        ScrubRule::new(
            "haired",
            format!(r"(?i)\b(?:{hc}|{hl}|{ht})[\s-]+haired\b"),
            DELETE,
        ),
        ScrubRule::new(
            "hair_style",
            format!(r"(?i)\b(?:(?:{hc}|{hl}|{ht})[\s-]+){{0,3}}(?:pixie[\s-]cut|bob[\s-]cut|buzz[\s-]cut|ponytail|pigtails|braids|braid|bun|bangs|dreadlocks|cornrows|updo|afro)\b"),
            DELETE,
        ),
        ScrubRule::new(
            "hair_color_noun",
            r"(?i)\b(?:blondes?|brunettes?|redheads?)\b".to_string(),
            DELETE,
        ),
        ScrubRule::new("possessive_hair", r"(?i)\b(?:her|his|their)\s+hair\b".to_string(), DELETE),
        ScrubRule::new(
            "hair_remnant",
            r"(?i)\bhair(?:style|cut|line|do)?s?\b".to_string(),
            DELETE,
        ),
        // -- eyes --
        ScrubRule::new(
            "eye_phrase",
            format!(r"(?i)\b(?:(?:{ed})[\s-]+(?:and\s+)?){{1,3}}eyes\b"),
            DELETE,
        ),
        ScrubRule::new("eyed", format!(r"(?i)\b(?:{ed})[\s-]+eyed\b"), DELETE),
        ScrubRule::new("eye_color", r"(?i)\beye[\s-]colou?r\b".to_string(), DELETE),
        ScrubRule::new(
            "lashes",
            r"(?i)\b(?:(?:long|thick|dark|full|fluttering|curled|false)[\s-]+){0,2}(?:eye)?lashes\b".to_string(),
            DELETE,
        ),
        ScrubRule::new(
            "brows",
            r"(?i)\b(?:(?:thick|thin|arched|bushy|dark|light|defined|sharp|full|groomed)[\s-]+){0,2}(?:eye)?brows\b".to_string(),
            DELETE,
        ),
        // -- skin --
        // "skin" must end the word so "skin-tight" stays wardrobe.
        ScrubRule::new(
            "skin_phrase",
            format!(r"(?i)\b(?:(?:{sd})[\s-]+(?:and\s+)?){{1,3}}(?:skin(?:[\s-]?tone)?|complexion|skinned)(\s|$|[,.;])"),
            "\u{1f}${1}",
        ),
        ScrubRule::new(
            "skin_tone_remnant",
            r"(?i)\bskin[\s-]?tone\b|\bcomplexion\b".to_string(),
            DELETE,
        ),
        ScrubRule::new(
            "skin_marks",
            r"(?i)\b(?:(?:light|faint|scattered|heavy)[\s-]+)?(?:freckles|beauty[\s-]marks?|birthmarks?|moles?)\b".to_string(),
            DELETE,
        ),
        // -- facial structure --
        ScrubRule::new(
            "lips",
            r"(?i)\b(?:(?:full|thin|plump|pouty|red|pink|glossy|rosy|soft|luscious)[\s-]+){1,2}lips\b".to_string(),
            DELETE,
        ),
        ScrubRule::new(
            "nose",
            r"(?i)\b(?:(?:small|button|straight|aquiline|roman|upturned|pointed|broad|narrow|long|short|petite|freckled)[\s-]+){1,2}nose\b".to_string(),
            DELETE,
        ),
        ScrubRule::new(
            "cheekbones",
            r"(?i)\b(?:(?:high|prominent|sharp|defined|chiseled|sculpted)[\s-]+){0,2}cheekbones\b".to_string(),
            DELETE,
        ),
        ScrubRule::new(
            "jaw",
            r"(?i)\b(?:(?:strong|sharp|square|chiseled|defined|angular|soft|pointed|rounded)[\s-]+){1,2}(?:jawline|jaw|chin)\b".to_string(),
            DELETE,
        ),
        ScrubRule::new(
            "face_shape",
            r"(?i)\b(?:(?:oval|round|heart[\s-]shaped|square|angular|soft|delicate|symmetrical|beautiful|pretty|handsome|youthful|freckled)[\s-]+){1,2}face\b".to_string(),
            DELETE,
        ),
        ScrubRule::new(
            "facial_features",
            r"(?i)\b(?:(?:delicate|sharp|soft|striking|chiseled|symmetrical|fine|strong)\s+(?:facial\s+)?|facial\s+)features\b".to_string(),
            DELETE,
        ),
        ScrubRule::new("dimples", r"(?i)\bdimples?\b".to_string(), DELETE),
        ScrubRule::new(
            "facial_hair",
            r"(?i)\b(?:(?:full|thick|short|trimmed|scruffy|neat|light|heavy|groomed)[\s-]+)?(?:beard|mustache|moustache|goatee|stubble|sideburns)\b".to_string(),
            DELETE,
        ),
        ScrubRule::new(
            "facial_structure",
            r"(?i)\bfacial\s+(?:structure|shape)\b".to_string(),
            DELETE,
        ),
        // -- grammar repair after adjective removal --
        ScrubRule::new("article_agreement", format!(r"(?i)\b(a)n\s+({p})\b"), "${1} ${2}"),
    ]
}

fn build_cleanup_rules() -> Vec<ScrubRule> {
    vec![
        ScrubRule::new("space_before_punct", r"\s+([,.;])".to_string(), "${1}"),
        ScrubRule::new("double_comma", r",(?:\s*,)+".to_string(), ","),
        ScrubRule::new("comma_before_period", r",\s*\.".to_string(), "."),
        ScrubRule::new("period_before_comma", r"\.\s*,".to_string(), "."),
        ScrubRule::new("whitespace_run", r"\s+".to_string(), " "),
        ScrubRule::new("edge_commas", r"^[\s,]+|[\s,]+$".to_string(), ""),
    ]
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// The ordered identity rule battery.
pub fn identity_rules() -> &'static [ScrubRule] {
    &IDENTITY_RULES
}

/// Look up an identity rule by name.
pub fn rule(name: &str) -> Option<&'static ScrubRule> {
    IDENTITY_RULES.iter().find(|r| r.name == name)
}

/// Remove every identity-revealing phrase from `text`.
///
/// Pure, total and idempotent.
pub fn scrub(text: &str) -> String {
    let mut current = strip_marks(text);
    for _ in 0..MAX_PASSES {
        let next = scrub_pass(&current);
        if next == current {
            break;
        }
        current = next;
    }
    current
}

/// Names of the identity rules that match somewhere in `text`.
pub fn matched_rules(text: &str) -> Vec<&'static str> {
    IDENTITY_RULES
        .iter()
        .filter(|r| r.matches(text))
        .map(|r| r.name)
        .collect()
}

/// Whether any identity rule matches `text`.
pub fn leaks_identity(text: &str) -> bool {
    IDENTITY_RULES.iter().any(|r| r.matches(text))
}

fn scrub_pass(text: &str) -> String {
    let mut out = text.to_string();
    for rule in IDENTITY_RULES.iter() {
        if let Cow::Owned(marked) = rule.apply_marked(&out) {
            out = strip_marks(&DANGLING_CONNECTOR.replace_all(&marked, "${1}"));
        }
    }
    for rule in CLEANUP_RULES.iter() {
        if let Cow::Owned(replaced) = rule.apply_marked(&out) {
            out = replaced;
        }
    }
    out
}

fn strip_marks(text: &str) -> String {
    text.replace(MARK, "")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
