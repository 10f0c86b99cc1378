//! Localized prompt strings for every step.
//!
//! Each language has one static table; a step picks its table from the
//! language answer and never mixes entries from two tables within a turn.
//! Templates use `{name}`, `{topic}` and `{url}` placeholders.

use super::choice::{Choice, ChoiceSet};
use super::model::Language;

/// Bilingual greeting shown before a language is known.
pub const LANGUAGE_PROMPT: &str = "Hujambo, karibu katika huduma yetu. Tafadhali chagua lugha inayokufaa (1. Kingereza), (2. Kiswahili). \
Hello, welcome to our service. Please choose your preferred language (1. English), (2. Kiswahili).";

pub const LANGUAGE_RETRY: &str = "Tafadhali chagua 1 au 2. Please choose 1 or 2.";

/// Stable values for choices whose labels vary by language.
pub mod values {
    pub const MAIN_MENU: &str = "main_menu";
    pub const GO_BACK: &str = "go_back";
    pub const NEWS: &str = "news";
    pub const UPDATE_PROFILE: &str = "update_profile";
    pub const LATEST_LEGAL_NEWS: &str = "latest_legal_news";
    pub const NEWS_LINKS: &str = "news_links";
}

/// The language choice set offered at the first step.
pub fn language_choices() -> ChoiceSet {
    ChoiceSet::new([
        Choice::new(Language::En.code(), "English").with_synonyms(["Kingereza"]),
        Choice::new(Language::Sw.code(), "Kiswahili").with_synonyms(["Swahili"]),
    ])
}

/// All user-facing text for one language.
#[derive(Debug)]
pub struct Strings {
    pub name_prompt: &'static str,
    pub name_retry: &'static str,
    pub name_thanks: &'static str,
    pub county_prompt: &'static str,
    pub county_retry: &'static str,
    pub subcounty_prompt: &'static str,
    pub ward_prompt: &'static str,
    pub choice_retry: &'static str,
    pub summary: &'static str,
    pub summary_main_menu: &'static str,
    pub summary_go_back: &'static str,
    pub restart: &'static str,
    pub retry_limit: &'static str,
    pub main_menu_prompt: &'static str,
    pub topic_unavailable: &'static str,
    pub sub_menu_prompt: &'static str,
    pub card_title: &'static str,
    pub card_body: &'static str,
    pub action_prompt: &'static str,
    pub action_links: &'static str,
    pub action_go_back: &'static str,
    pub news_link: &'static str,
    pub finished: &'static str,
}

static EN: Strings = Strings {
    name_prompt: "Please enter your name.",
    name_retry: "Your name cannot be empty. Please enter your name.",
    name_thanks: "Thanks {name}.",
    county_prompt: "Which county do you live in?",
    county_retry: "Please enter a valid county name.",
    subcounty_prompt: "Which sub-county do you live in?",
    ward_prompt: "Which ward do you live in?",
    choice_retry: "Sorry, that is not one of the options.",
    summary: "CONGRATULATIONS!! {name}, you are now registered to our services. Please select 1) MAIN MENU 2) GO BACK to continue with our service.",
    summary_main_menu: "MAIN MENU",
    summary_go_back: "GO BACK",
    restart: "Let's start again.",
    retry_limit: "Too many invalid replies. Let's start again.",
    main_menu_prompt: "Welcome back {name}. Please choose from the main menu.",
    topic_unavailable: "{topic} is not available yet. Please choose another option.",
    sub_menu_prompt: "Please choose from the sub-menu.",
    card_title: "Latest legal news",
    card_body: "Good evening",
    action_prompt: "Choose an action.",
    action_links: "Links to legal news",
    action_go_back: "Go back",
    news_link: "Read the latest legal news here: {url}",
    finished: "Thank you {name}. Your registration is complete.",
};

static SW: Strings = Strings {
    name_prompt: "Tafadhali weka jina lako.",
    name_retry: "Jina haliwezi kuwa tupu. Tafadhali weka jina lako.",
    name_thanks: "Asante {name}.",
    county_prompt: "Weka Kaunti unayoishi.",
    county_retry: "Tafadhali weka Kaunti sahihi.",
    subcounty_prompt: "Unaishi SabKaunti gani?",
    ward_prompt: "Unaishi wadi gani?",
    choice_retry: "Samahani, hilo si mojawapo ya chaguo.",
    summary: "Hongera {name}, sasa usajili wako umekamilika. Chagua 1) MAIN MENU 2) RUDI NYUMA.",
    summary_main_menu: "MAIN MENU",
    summary_go_back: "RUDI NYUMA",
    restart: "Tuanze upya.",
    retry_limit: "Majibu mengi si sahihi. Tuanze upya.",
    main_menu_prompt: "Karibu tena {name}, tafadhali chagua kwa menu uliyopewa.",
    topic_unavailable: "{topic} bado haipatikani. Tafadhali chagua chaguo lingine.",
    sub_menu_prompt: "Tafadhali chagua kutoka kwa sab-menu uliyopewa.",
    card_title: "Habari za kisheria za hivi punde",
    card_body: "Habari za jioni",
    action_prompt: "Chagua hatua.",
    action_links: "Viungo vya habari za kisheria",
    action_go_back: "Rudi nyuma",
    news_link: "Soma habari za kisheria hapa: {url}",
    finished: "Asante {name}. Usajili wako umekamilika.",
};

/// The string table for a language.
pub fn strings(language: Language) -> &'static Strings {
    match language {
        Language::En => &EN,
        Language::Sw => &SW,
    }
}

impl Strings {
    pub fn thanks(&self, name: &str) -> String {
        self.name_thanks.replace("{name}", name)
    }

    pub fn summary(&self, name: &str) -> String {
        self.summary.replace("{name}", name)
    }

    pub fn main_menu(&self, name: &str) -> String {
        self.main_menu_prompt.replace("{name}", name)
    }

    pub fn unavailable(&self, topic: &str) -> String {
        self.topic_unavailable.replace("{topic}", topic)
    }

    pub fn news_link(&self, url: &str) -> String {
        self.news_link.replace("{url}", url)
    }

    pub fn finished(&self, name: &str) -> String {
        self.finished.replace("{name}", name)
    }

    /// Retry wording for a choice prompt: the apology followed by the prompt.
    pub fn choice_retry(&self, prompt: &str) -> String {
        format!("{} {}", self.choice_retry, prompt)
    }

    pub fn summary_choices(&self) -> ChoiceSet {
        ChoiceSet::new([
            Choice::new(values::MAIN_MENU, self.summary_main_menu),
            Choice::new(values::GO_BACK, self.summary_go_back).with_synonyms(["back"]),
        ])
    }

    /// The six main-menu topics. Labels are shared across languages.
    pub fn main_menu_choices(&self) -> ChoiceSet {
        ChoiceSet::new([
            Choice::new("information", "INFORMATION"),
            Choice::new(values::NEWS, "NEWS").with_synonyms(["habari"]),
            Choice::new("referral", "REFERRAL"),
            Choice::new("survey", "SURVEY"),
            Choice::new(values::UPDATE_PROFILE, "UPDATE PROFILE"),
            Choice::new("share", "SHARE"),
        ])
    }

    pub fn sub_menu_choices(&self) -> ChoiceSet {
        ChoiceSet::new([Choice::new(values::LATEST_LEGAL_NEWS, "LATEST LEGAL NEWS")])
    }

    pub fn action_choices(&self) -> ChoiceSet {
        ChoiceSet::new([
            Choice::new(values::NEWS_LINKS, self.action_links),
            Choice::new(values::GO_BACK, self.action_go_back),
        ])
    }
}
