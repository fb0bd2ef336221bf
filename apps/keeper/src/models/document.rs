use serde::{Deserialize, Serialize};

/// Schema version written by this build. Older payloads are upgraded by
/// `integrity::migration` before validation.
pub const CURRENT_VERSION: u32 = 2;

/// Identity section ("personal info"). Every field is plain text so an empty
/// section is a valid default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersonalInfo {
    pub full_name: String,
    pub job_title: String,
    pub email: String,
    pub phone: String,
    pub location: String,
    pub summary: String,
    pub linkedin: String,
    pub website: String,
}

/// Intent section ("objective").
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Objective {
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EducationEntry {
    pub institution: String,
    pub degree: String,
    pub field_of_study: String,
    pub start_date: String,
    pub end_date: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExperienceEntry {
    pub company: String,
    pub position: String,
    pub location: String,
    pub start_date: String,
    pub end_date: String,
    pub current: bool,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SkillEntry {
    pub name: String,
    pub level: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LanguageEntry {
    pub name: String,
    pub proficiency: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CourseEntry {
    pub name: String,
    pub institution: String,
    pub date: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectEntry {
    pub name: String,
    pub description: String,
    pub url: String,
    pub technologies: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AchievementEntry {
    pub title: String,
    pub date: String,
    pub description: String,
}

/// The résumé document persisted by the browser UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeDocument {
    pub version: u32,
    pub personal_info: PersonalInfo,
    pub objective: Objective,
    pub education: Vec<EducationEntry>,
    pub experience: Vec<ExperienceEntry>,
    pub skills: Vec<SkillEntry>,
    pub languages: Vec<LanguageEntry>,
    pub courses: Vec<CourseEntry>,
    pub projects: Vec<ProjectEntry>,
    pub achievements: Vec<AchievementEntry>,
}

impl Default for ResumeDocument {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            personal_info: PersonalInfo::default(),
            objective: Objective::default(),
            education: Vec::new(),
            experience: Vec::new(),
            skills: Vec::new(),
            languages: Vec::new(),
            courses: Vec::new(),
            projects: Vec::new(),
            achievements: Vec::new(),
        }
    }
}

/// The two scalar sections of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarSection {
    PersonalInfo,
    Objective,
}

impl ScalarSection {
    pub const ALL: [ScalarSection; 2] = [ScalarSection::PersonalInfo, ScalarSection::Objective];

    /// JSON key of the section inside the stored document.
    pub fn key(self) -> &'static str {
        match self {
            ScalarSection::PersonalInfo => "personalInfo",
            ScalarSection::Objective => "objective",
        }
    }

    /// Serialized default value of the section.
    pub fn default_value(self) -> serde_json::Value {
        match self {
            ScalarSection::PersonalInfo => serde_json::to_value(PersonalInfo::default()),
            ScalarSection::Objective => serde_json::to_value(Objective::default()),
        }
        .unwrap_or_else(|_| serde_json::Value::Object(serde_json::Map::new()))
    }

    /// Checks that `value` converts into the section's typed struct.
    pub fn check_typed(self, value: &serde_json::Value) -> Result<(), serde_json::Error> {
        match self {
            ScalarSection::PersonalInfo => PersonalInfo::deserialize(value).map(drop),
            ScalarSection::Objective => Objective::deserialize(value).map(drop),
        }
    }
}

/// The ordered list sections of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListSection {
    Education,
    Experience,
    Skills,
    Languages,
    Courses,
    Projects,
    Achievements,
}

impl ListSection {
    pub const ALL: [ListSection; 7] = [
        ListSection::Education,
        ListSection::Experience,
        ListSection::Skills,
        ListSection::Languages,
        ListSection::Courses,
        ListSection::Projects,
        ListSection::Achievements,
    ];

    pub fn key(self) -> &'static str {
        match self {
            ListSection::Education => "education",
            ListSection::Experience => "experience",
            ListSection::Skills => "skills",
            ListSection::Languages => "languages",
            ListSection::Courses => "courses",
            ListSection::Projects => "projects",
            ListSection::Achievements => "achievements",
        }
    }

    /// Checks that one item converts into the section's typed entry.
    pub fn check_entry(self, item: &serde_json::Value) -> Result<(), serde_json::Error> {
        match self {
            ListSection::Education => EducationEntry::deserialize(item).map(drop),
            ListSection::Experience => ExperienceEntry::deserialize(item).map(drop),
            ListSection::Skills => SkillEntry::deserialize(item).map(drop),
            ListSection::Languages => LanguageEntry::deserialize(item).map(drop),
            ListSection::Courses => CourseEntry::deserialize(item).map(drop),
            ListSection::Projects => ProjectEntry::deserialize(item).map(drop),
            ListSection::Achievements => AchievementEntry::deserialize(item).map(drop),
        }
    }
}
