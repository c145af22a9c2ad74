//! Add Item Form
//!
//! Holds the field values and per-field errors of the add-item screen.

use crate::models::{
    Category, Field, Gateway, GatewayError, GatewayResult, ItemId, NewItem, ValidationErrors,
};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ItemForm {
    title: String,
    description: String,
    category: Category,
    errors: ValidationErrors,
}

impl ItemForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn category(&self) -> Category {
        self.category
    }

    /// Editing a field clears its error
    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
        self.errors.remove(Field::Title);
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
        self.errors.remove(Field::Description);
    }

    pub fn set_category(&mut self, category: Category) {
        self.category = category;
        self.errors.remove(Field::Category);
    }

    pub fn errors(&self) -> &ValidationErrors {
        &self.errors
    }

    pub fn error(&self, field: Field) -> Option<&str> {
        self.errors.get(field)
    }

    fn draft(&self) -> NewItem {
        NewItem::new(self.title.clone(), self.description.clone(), self.category)
    }

    /// Recompute field errors; true when the form can be submitted
    pub fn validate(&mut self) -> bool {
        self.errors = match self.draft().validate() {
            Ok(()) => ValidationErrors::default(),
            Err(errors) => errors,
        };
        self.errors.is_empty()
    }

    /// Back to an empty form with the default category
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Validate and create the item.
    ///
    /// Nothing is sent while a field is invalid. On success the form is
    /// cleared; on failure it is left as typed so the user can retry.
    pub async fn submit(&mut self, gateway: &Gateway) -> GatewayResult<ItemId> {
        if !self.validate() {
            return Err(GatewayError::Invalid(self.errors.clone()));
        }

        match gateway.create(self.draft().normalized()).await {
            Ok(id) => {
                self.reset();
                Ok(id)
            }
            Err(GatewayError::Invalid(errors)) => {
                self.errors = errors.clone();
                Err(GatewayError::Invalid(errors))
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to add item");
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use data_items_lib::gateway::GatewayOptions;
    use data_items_lib::repository::MemoryCollection;
    use std::sync::Arc;
    use test_case::test_case;

    fn setup() -> (Arc<MemoryCollection>, Gateway) {
        let collection = Arc::new(MemoryCollection::new("dataItems"));
        let gateway = Gateway::new(collection.clone(), GatewayOptions::default());
        (collection, gateway)
    }

    #[test]
    fn test_defaults() {
        let form = ItemForm::new();
        assert_eq!(form.title(), "");
        assert_eq!(form.category(), Category::Personal);
        assert!(form.errors().is_empty());
    }

    #[test_case("", "", Some("Title is required"), Some("Description is required"); "both empty")]
    #[test_case("  ", "desc", Some("Title is required"), None; "blank title")]
    #[test_case("Trip", "\t", None, Some("Description is required"); "blank description")]
    #[test_case("Trip", "Pack bags", None, None; "valid")]
    fn test_validate(
        title: &str,
        description: &str,
        title_error: Option<&str>,
        description_error: Option<&str>,
    ) {
        let mut form = ItemForm::new();
        form.set_title(title);
        form.set_description(description);

        let valid = form.validate();

        assert_eq!(valid, title_error.is_none() && description_error.is_none());
        assert_eq!(form.error(Field::Title), title_error);
        assert_eq!(form.error(Field::Description), description_error);
    }

    #[test]
    fn test_editing_clears_only_that_error() {
        let mut form = ItemForm::new();
        assert!(!form.validate());

        form.set_title("T");
        assert_eq!(form.error(Field::Title), None);
        assert_eq!(form.error(Field::Description), Some("Description is required"));
    }

    #[tokio::test]
    async fn test_invalid_submit_sends_nothing() {
        let (_, gateway) = setup();
        let mut form = ItemForm::new();
        form.set_description("only a description");

        let err = form.submit(&gateway).await.unwrap_err();

        assert!(matches!(err, GatewayError::Invalid(_)));
        assert_eq!(form.error(Field::Title), Some("Title is required"));
        assert_eq!(form.description(), "only a description");
        assert!(gateway.fetch_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_successful_submit_resets_form() {
        let (_, gateway) = setup();
        let mut form = ItemForm::new();
        form.set_title("  Trip ");
        form.set_description("Pack bags");
        form.set_category(Category::Travel);

        let id = form.submit(&gateway).await.expect("submit failed");

        assert_eq!(form, ItemForm::new());
        let items = gateway.fetch_all().await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, id);
        assert_eq!(items[0].title, "Trip");
        assert_eq!(items[0].category, Category::Travel);
    }

    #[tokio::test]
    async fn test_failed_submit_keeps_input() {
        let (collection, gateway) = setup();
        collection.fail_next_write();

        let mut form = ItemForm::new();
        form.set_title("Budget");
        form.set_description("Monthly");
        form.set_category(Category::Finance);
        let before = form.clone();

        let err = form.submit(&gateway).await.unwrap_err();

        assert!(matches!(err, GatewayError::WriteFailure(_)));
        assert_eq!(form, before);

        // Retrying the same input works once the store accepts writes
        form.submit(&gateway).await.unwrap();
        assert_eq!(gateway.fetch_all().await.unwrap().len(), 1);
    }
}
