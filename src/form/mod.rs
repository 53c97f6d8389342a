use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

use crate::model::HospitalRecord;

pub const MAX_FIELD_LEN: usize = 200;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FormField {
    Identifier,
    Name,
    Region,
    Delegation,
    Commune,
    Category,
}

impl FormField {
    pub const ALL: [FormField; 6] = [
        FormField::Identifier,
        FormField::Name,
        FormField::Region,
        FormField::Delegation,
        FormField::Commune,
        FormField::Category,
    ];

    pub fn label(self) -> &'static str {
        match self {
            FormField::Identifier => "Identifiant",
            FormField::Name => "Nom de l'établissement",
            FormField::Region => "Région",
            FormField::Delegation => "Délégation",
            FormField::Commune => "Commune",
            FormField::Category => "Catégorie",
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            FormField::Identifier => "id",
            FormField::Name => "name",
            FormField::Region => "region",
            FormField::Delegation => "delegation",
            FormField::Commune => "commune",
            FormField::Category => "category",
        }
    }

    pub fn parse(key: &str) -> Option<FormField> {
        match key.trim().to_lowercase().as_str() {
            "id" | "_id" => Some(FormField::Identifier),
            "name" | "nom" | "nom_etablissement" => Some(FormField::Name),
            "region" => Some(FormField::Region),
            "delegation" => Some(FormField::Delegation),
            "commune" => Some(FormField::Commune),
            "category" | "categorie" => Some(FormField::Category),
            _ => None,
        }
    }

    fn required(self) -> bool {
        self != FormField::Identifier
    }
}

/// Raw text of each input, exactly as typed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FormFields {
    pub id: String,
    pub name: String,
    pub region: String,
    pub delegation: String,
    pub commune: String,
    pub category: String,
}

impl FormFields {
    pub fn from_record(record: &HospitalRecord) -> Self {
        let text = |v: &Option<String>| v.clone().unwrap_or_default();
        FormFields {
            id: text(&record.id),
            name: text(&record.name),
            region: text(&record.region),
            delegation: text(&record.delegation),
            commune: text(&record.commune),
            category: text(&record.category),
        }
    }

    pub fn get(&self, field: FormField) -> &str {
        match field {
            FormField::Identifier => &self.id,
            FormField::Name => &self.name,
            FormField::Region => &self.region,
            FormField::Delegation => &self.delegation,
            FormField::Commune => &self.commune,
            FormField::Category => &self.category,
        }
    }

    pub fn set(&mut self, field: FormField, value: &str) {
        let slot = match field {
            FormField::Identifier => &mut self.id,
            FormField::Name => &mut self.name,
            FormField::Region => &mut self.region,
            FormField::Delegation => &mut self.delegation,
            FormField::Commune => &mut self.commune,
            FormField::Category => &mut self.category,
        };
        *slot = value.to_string();
    }

    /// The payload sent on save: the six edited fields, trimmed, with a blank
    /// identifier left out so the backend assigns one.
    pub fn to_record(&self) -> HospitalRecord {
        let text = |v: &str| {
            let v = v.trim();
            (!v.is_empty()).then(|| v.to_string())
        };
        HospitalRecord {
            id: text(&self.id),
            name: text(&self.name),
            region: text(&self.region),
            delegation: text(&self.delegation),
            commune: text(&self.commune),
            category: text(&self.category),
            extra: Default::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldProblem {
    Required,
    TooLong { max: usize },
    InvalidFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldError {
    pub field: FormField,
    pub problem: FieldProblem,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.problem {
            FieldProblem::Required => write!(f, "{} est obligatoire", self.field.label()),
            FieldProblem::TooLong { max } => {
                write!(f, "{} dépasse {max} caractères", self.field.label())
            }
            FieldProblem::InvalidFormat => write!(
                f,
                "{} ne peut contenir que lettres, chiffres, '_', '-' et '.'",
                self.field.label()
            ),
        }
    }
}

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_.\-]+$").expect("valid identifier pattern"))
}

/// Presence and format checks run before any request is made.
pub fn validate(fields: &FormFields) -> Vec<FieldError> {
    let mut errors = Vec::new();
    for field in FormField::ALL {
        let value = fields.get(field).trim();
        let problem = if value.is_empty() {
            field.required().then_some(FieldProblem::Required)
        } else if value.chars().count() > MAX_FIELD_LEN {
            Some(FieldProblem::TooLong { max: MAX_FIELD_LEN })
        } else if field == FormField::Identifier && !identifier_pattern().is_match(value) {
            Some(FieldProblem::InvalidFormat)
        } else {
            None
        };
        if let Some(problem) = problem {
            errors.push(FieldError { field, problem });
        }
    }
    errors
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModalIntent {
    Create,
    View { id: String },
    Edit { id: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldMode {
    Editable,
    ReadOnly,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HospitalForm {
    intent: ModalIntent,
    fields: FormFields,
    mode: FieldMode,
    save_visible: bool,
    was_validated: bool,
    errors: Vec<FieldError>,
}

impl HospitalForm {
    fn new(intent: ModalIntent, fields: FormFields) -> Self {
        let read_only = matches!(intent, ModalIntent::View { .. });
        HospitalForm {
            intent,
            fields,
            mode: if read_only {
                FieldMode::ReadOnly
            } else {
                FieldMode::Editable
            },
            save_visible: !read_only,
            was_validated: false,
            errors: Vec::new(),
        }
    }

    pub fn intent(&self) -> &ModalIntent {
        &self.intent
    }

    pub fn title(&self) -> &'static str {
        match self.intent {
            ModalIntent::Create => "Ajouter un Hôpital",
            ModalIntent::View { .. } => "Détails de l'Hôpital",
            ModalIntent::Edit { .. } => "Modifier l'Hôpital",
        }
    }

    pub fn fields(&self) -> &FormFields {
        &self.fields
    }

    pub fn mode(&self) -> FieldMode {
        self.mode
    }

    pub fn save_visible(&self) -> bool {
        self.save_visible
    }

    pub fn was_validated(&self) -> bool {
        self.was_validated
    }

    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    pub fn error_for(&self, field: FormField) -> Option<&FieldError> {
        self.errors.iter().find(|e| e.field == field)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Modal {
    Record(HospitalForm),
    ConfirmDelete { id: String },
}

/// What a successful save asks the backend to do.
#[derive(Clone, Debug, PartialEq)]
pub enum Submission {
    Create(HospitalRecord),
    Update { id: String, record: HospitalRecord },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FormError {
    #[error("no form is open")]
    NoForm,

    #[error("no deletion is awaiting confirmation")]
    NoPendingDelete,

    #[error("the form is read-only")]
    ReadOnly,

    #[error("{} invalid field(s): {}", errors.len(), join_errors(errors))]
    Invalid { errors: Vec<FieldError> },
}

fn join_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// The single modal the client can have open at a time.
#[derive(Clone, Debug, Default)]
pub struct FormController {
    modal: Option<Modal>,
}

impl FormController {
    pub fn new() -> Self {
        FormController::default()
    }

    pub fn open_create(&mut self) {
        self.open_record(ModalIntent::Create, FormFields::default())
    }

    pub fn open_view(&mut self, id: &str, record: &HospitalRecord) {
        self.open_record(
            ModalIntent::View { id: id.to_string() },
            FormFields::from_record(record),
        )
    }

    pub fn open_edit(&mut self, id: &str, record: &HospitalRecord) {
        self.open_record(
            ModalIntent::Edit { id: id.to_string() },
            FormFields::from_record(record),
        )
    }

    fn open_record(&mut self, intent: ModalIntent, fields: FormFields) {
        self.modal = Some(Modal::Record(HospitalForm::new(intent, fields)));
    }

    pub fn open_delete(&mut self, id: &str) {
        self.modal = Some(Modal::ConfirmDelete { id: id.to_string() });
    }

    pub fn modal(&self) -> Option<&Modal> {
        self.modal.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.modal.is_some()
    }

    pub fn form(&self) -> Option<&HospitalForm> {
        match &self.modal {
            Some(Modal::Record(form)) => Some(form),
            _ => None,
        }
    }

    pub fn pending_delete(&self) -> Option<&str> {
        match &self.modal {
            Some(Modal::ConfirmDelete { id }) => Some(id),
            _ => None,
        }
    }

    pub fn set_field(&mut self, field: FormField, value: &str) -> Result<(), FormError> {
        let form = match &mut self.modal {
            Some(Modal::Record(form)) => form,
            _ => return Err(FormError::NoForm),
        };
        if form.mode == FieldMode::ReadOnly {
            return Err(FormError::ReadOnly);
        }
        form.fields.set(field, value);
        Ok(())
    }

    /// Validates the open form. On failure the invalid fields are marked and
    /// the form stays open untouched otherwise.
    pub fn submit(&mut self) -> Result<Submission, FormError> {
        let form = match &mut self.modal {
            Some(Modal::Record(form)) => form,
            _ => return Err(FormError::NoForm),
        };
        if !form.save_visible {
            return Err(FormError::ReadOnly);
        }

        form.was_validated = true;
        form.errors = validate(&form.fields);
        if !form.errors.is_empty() {
            return Err(FormError::Invalid {
                errors: form.errors.clone(),
            });
        }

        let record = form.fields.to_record();
        match &form.intent {
            ModalIntent::Create => Ok(Submission::Create(record)),
            ModalIntent::Edit { id } => Ok(Submission::Update {
                id: id.clone(),
                record,
            }),
            ModalIntent::View { .. } => Err(FormError::ReadOnly),
        }
    }

    pub fn close(&mut self) {
        self.modal = None;
    }
}
