//! System prompts bundled at compile time, one per LLM call site.

/// CV Parser - structured applicant profile
pub const CV_PARSER: &str = include_str!("defaults/cv_parser.md");

/// Professor Researcher - profile synthesis from gathered evidence
pub const PROFESSOR_RESEARCHER: &str = include_str!("defaults/professor_researcher.md");

/// Gathering oracle - which papers to fetch next
pub const PAPER_DECISION: &str = include_str!("defaults/paper_decision.md");

/// Gathering oracle - is what we have enough
pub const PAPER_SUFFICIENCY: &str = include_str!("defaults/paper_sufficiency.md");

/// Gathering oracle - titles beyond the professor's known papers
pub const EXTERNAL_PAPER_SEARCH: &str = include_str!("defaults/external_paper_search.md");

pub const FIT_ANALYZER: &str = include_str!("defaults/fit_analyzer.md");

pub const EMAIL_WRITER: &str = include_str!("defaults/email_writer.md");

pub const CV_RECOMMENDER: &str = include_str!("defaults/cv_recommender.md");

pub const MOTIVATION_LETTER: &str = include_str!("defaults/motivation_letter.md");

pub const RESEARCH_PROPOSAL: &str = include_str!("defaults/research_proposal.md");

/// All bundled prompts with their slugs
pub fn all_defaults() -> Vec<(&'static str, &'static str)> {
    vec![
        ("cv_parser", CV_PARSER),
        ("professor_researcher", PROFESSOR_RESEARCHER),
        ("paper_decision", PAPER_DECISION),
        ("paper_sufficiency", PAPER_SUFFICIENCY),
        ("external_paper_search", EXTERNAL_PAPER_SEARCH),
        ("fit_analyzer", FIT_ANALYZER),
        ("email_writer", EMAIL_WRITER),
        ("cv_recommender", CV_RECOMMENDER),
        ("motivation_letter", MOTIVATION_LETTER),
        ("research_proposal", RESEARCH_PROPOSAL),
    ]
}
