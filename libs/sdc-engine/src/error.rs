use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("show_review_page_first requires enable_review_page")]
    ReviewFirstWithoutReviewPage,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Neither a questionnaire JSON string nor a questionnaire path was provided")]
    MissingQuestionnaire,

    #[error("Questionnaire item {0} must have type")]
    MissingItemType(String),

    #[error("{first} and {second} have cyclic dependency in expression based extension")]
    CyclicDependency { first: String, second: String },

    #[error("Mismatching Questionnaire {questionnaire} and QuestionnaireResponse (for Questionnaire {response})")]
    QuestionnaireMismatch {
        questionnaire: String,
        response: String,
    },

    #[error("Missing questionnaire item for questionnaire response item {0}")]
    MissingQuestionnaireItem(String),

    #[error("Multiple answers for non-repeat questionnaire item {0}")]
    MultipleAnswers(String),

    #[error("Mismatching question type {item_type} and answer type {answer_type} for {link_id}")]
    AnswerTypeMismatch {
        link_id: String,
        item_type: String,
        answer_type: String,
    },

    #[error("Questionnaire item {0} has initial value(s) and is a group or display item. See rule que-8 at https://www.hl7.org/fhir/questionnaire-definitions.html#Questionnaire.item.initial.")]
    InitialValueOnGroup(String),

    #[error("Questionnaire item {0} has both initial value(s) and has answerOption. See rule que-11 at https://www.hl7.org/fhir/questionnaire-definitions.html#Questionnaire.item.initial.")]
    InitialValueWithAnswerOption(String),

    #[error("Questionnaire item {0} can only have multiple initial values for repeating items. See rule que-13 at https://www.hl7.org/fhir/questionnaire-definitions.html#Questionnaire.item.initial.")]
    MultipleInitialValues(String),

    #[error("{0}")]
    InvalidLaunchContext(String),

    #[error("XFhirQueryResolver must be provided to evaluate x-fhir-query expression '{0}'")]
    MissingXFhirQueryResolver(String),

    #[error("Unsupported expression language {0}")]
    UnsupportedExpressionLanguage(String),

    #[error("Comparison of {0} answers is not implemented")]
    NotImplemented(String),

    #[error("No response item at {0}")]
    UnknownItem(String),

    #[error("Invalid item path '{0}'")]
    InvalidPath(String),

    #[error("{0} is not a repeated group")]
    NotARepeatedGroup(String),

    #[error("Resolver failed: {0}")]
    Resolver(String),

    #[error(transparent)]
    Model(#[from] sdc_models::Error),

    #[error("FHIRPath error: {0}")]
    FhirPath(#[from] sdc_fhirpath::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, Error>;
