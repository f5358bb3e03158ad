use super::models::{CatalogStats, Price, ProductDraft, ProductRecord};
use super::{CatalogError, SyncOptions, WritePolicy};
use crate::database::{DatabasePath, DatabaseReference, KeyedStore, StoreError};
use serde_json::{json, Map};

/// Local product list, add form and edit dialog state for one dashboard.
pub struct CatalogSynchronizer<S: KeyedStore> {
    store: S,
    root: DatabasePath,
    options: SyncOptions,
    products: Vec<ProductRecord>,
    draft: ProductDraft,
    editing: Option<ProductRecord>,
}

impl<S: KeyedStore> CatalogSynchronizer<S> {
    /// Creates an empty synchronizer for the collection at `root`.
    pub fn new(store: S, root: DatabasePath, options: SyncOptions) -> Self {
        Self {
            store,
            root,
            options,
            products: Vec::new(),
            draft: ProductDraft::default(),
            editing: None,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn products(&self) -> &[ProductRecord] {
        &self.products
    }

    pub fn get(&self, id: &str) -> Option<&ProductRecord> {
        self.products.iter().find(|p| p.id == id)
    }

    pub fn draft(&self) -> &ProductDraft {
        &self.draft
    }

    /// The add form, for binding inputs.
    pub fn draft_mut(&mut self) -> &mut ProductDraft {
        &mut self.draft
    }

    pub fn editing(&self) -> Option<&ProductRecord> {
        self.editing.as_ref()
    }

    /// The record in the edit dialog, for binding inputs.
    pub fn editing_mut(&mut self) -> Option<&mut ProductRecord> {
        self.editing.as_mut()
    }

    pub fn stats(&self) -> CatalogStats {
        CatalogStats::from_products(&self.products)
    }

    fn collection(&self) -> DatabaseReference<'_, S> {
        DatabaseReference::new(&self.store, self.root.clone())
    }

    /// Reads the whole collection and replaces the local list with it.
    ///
    /// A missing collection yields an empty list. On failure the list is left
    /// as it was. Entries missing `name` or `price`, or that otherwise do not
    /// decode as products, are skipped with a warning.
    pub async fn load(&mut self) -> Result<(), CatalogError> {
        let children = match self.collection().fetch_all().await {
            Ok(children) => children,
            Err(e) => {
                tracing::error!(path = %self.root, "Error loading products: {}", e);
                return Err(e.into());
            }
        };

        self.products = children
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(id, value)| match ProductRecord::from_stored(id.clone(), value) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!(product_id = %id, "Skipping malformed product: {}", e);
                    None
                }
            })
            .collect();

        tracing::debug!(count = self.products.len(), "products loaded");
        Ok(())
    }

    /// Creates a product from the add form.
    ///
    /// The key is minted before the write, and the product joins the local
    /// list only once the write succeeds; the form is then reset. On failure
    /// the form keeps its contents. Returns the new id.
    pub async fn add(&mut self) -> Result<String, CatalogError> {
        let price = self.draft.validate()?;
        let stored = self.draft.to_stored(price);

        let written = async {
            let reference = self.collection().push()?;
            reference.set(&stored).await?;
            Ok::<_, StoreError>(reference.key().unwrap_or_default().to_string())
        }
        .await;

        let id = match written {
            Ok(id) => id,
            Err(e) => {
                tracing::error!("Error adding product: {}", e);
                return Err(e.into());
            }
        };

        let mut draft = std::mem::take(&mut self.draft);
        if self.options.coerce_local_price {
            draft.price = Price::Number(price);
        }
        self.products.push(ProductRecord::from_draft(id.clone(), draft));
        tracing::info!(product_id = %id, "product added");
        Ok(id)
    }

    /// Flips availability from `current_status`.
    ///
    /// With [`WritePolicy::Optimistic`] the local record changes even if the
    /// store write fails.
    pub async fn toggle_availability(&mut self, id: &str, current_status: bool) -> Result<(), CatalogError> {
        if self.get(id).is_none() {
            return Err(CatalogError::UnknownProduct(id.to_string()));
        }
        let next = !current_status;

        let mut fields = Map::new();
        fields.insert("availability".into(), json!(next));

        if self.options.write_policy == WritePolicy::Optimistic {
            self.set_local_availability(id, next);
        }

        let written = async { self.collection().child(id)?.update(&fields).await }.await;
        if let Err(e) = written {
            tracing::error!(product_id = %id, "Error updating availability: {}", e);
            return Err(e.into());
        }

        if self.options.write_policy == WritePolicy::Confirmed {
            self.set_local_availability(id, next);
        }
        Ok(())
    }

    fn set_local_availability(&mut self, id: &str, availability: bool) {
        for product in self.products.iter_mut().filter(|p| p.id == id) {
            product.availability = availability;
        }
    }

    /// Opens the edit dialog on a copy of the product. Touches nothing remote.
    pub fn edit(&mut self, id: &str) -> Result<&mut ProductRecord, CatalogError> {
        let record = self
            .get(id)
            .cloned()
            .ok_or_else(|| CatalogError::UnknownProduct(id.to_string()))?;
        Ok(self.editing.insert(record))
    }

    /// Closes the edit dialog, discarding changes.
    pub fn cancel_edit(&mut self) {
        self.editing = None;
    }

    /// Writes name, price, category and image from the edit dialog.
    ///
    /// On success the local record is replaced by the edited copy and the
    /// dialog closes. On failure the dialog stays open with its changes.
    pub async fn save_edit(&mut self) -> Result<(), CatalogError> {
        let edited = self.editing.as_ref().ok_or(CatalogError::NotEditing)?;
        let price = edited.validate()?;
        let fields = edited.edit_fields(price);
        let id = edited.id.clone();

        let written = async { self.collection().child(&id)?.update(&fields).await }.await;
        if let Err(e) = written {
            tracing::error!(product_id = %id, "Error updating product: {}", e);
            return Err(e.into());
        }

        if let Some(mut edited) = self.editing.take() {
            if self.options.coerce_local_price {
                edited.price = Price::Number(price);
            }
            for product in self.products.iter_mut().filter(|p| p.id == id) {
                *product = edited.clone();
            }
        }
        tracing::info!(product_id = %id, "product updated");
        Ok(())
    }

    /// Deletes a product. No confirmation is asked for.
    ///
    /// With [`WritePolicy::Optimistic`] the product leaves the local list even
    /// if the store delete fails.
    pub async fn delete(&mut self, id: &str) -> Result<(), CatalogError> {
        if self.options.write_policy == WritePolicy::Optimistic {
            self.products.retain(|p| p.id != id);
        }

        let removed = async { self.collection().child(id)?.remove().await }.await;
        if let Err(e) = removed {
            tracing::error!(product_id = %id, "Error deleting product: {}", e);
            return Err(e.into());
        }

        if self.options.write_policy == WritePolicy::Confirmed {
            self.products.retain(|p| p.id != id);
        }
        tracing::info!(product_id = %id, "product deleted");
        Ok(())
    }
}
