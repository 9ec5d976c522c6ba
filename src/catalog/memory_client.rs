//! In-memory catalog.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::client::{CatalogClient, CatalogError};
use super::types::{
    AdjustOutcome, AvailabilityChange, Book, BookDetailsUpdate, BookStatus, NewBook,
};

/// Books keyed by id. Each adjustment runs under the entry's shard lock.
#[derive(Default)]
pub struct MemoryCatalog {
    books: DashMap<String, Book>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.books.len()
    }

    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }
}

#[async_trait]
impl CatalogClient for MemoryCatalog {
    async fn get_book(&self, book_id: &str) -> Result<Book, CatalogError> {
        self.books
            .get(book_id)
            .map(|book| book.clone())
            .ok_or_else(|| CatalogError::NotFound(book_id.to_string()))
    }

    async fn insert_book(&self, book: NewBook) -> Result<Book, CatalogError> {
        book.validate().map_err(CatalogError::Validation)?;

        match self.books.entry(book.book_id.clone()) {
            Entry::Occupied(_) => Err(CatalogError::AlreadyExists(book.book_id)),
            Entry::Vacant(slot) => {
                let book = book.into_book();
                slot.insert(book.clone());
                Ok(book)
            }
        }
    }

    async fn update_details(
        &self,
        book_id: &str,
        update: BookDetailsUpdate,
    ) -> Result<Book, CatalogError> {
        update.validate().map_err(CatalogError::Validation)?;

        let mut book = self
            .books
            .get_mut(book_id)
            .ok_or_else(|| CatalogError::NotFound(book_id.to_string()))?;
        update.apply(&mut book);
        Ok(book.clone())
    }

    async fn adjust_availability(
        &self,
        book_id: &str,
        change: AvailabilityChange,
    ) -> Result<AdjustOutcome, CatalogError> {
        let Some(mut book) = self.books.get_mut(book_id) else {
            return Ok(AdjustOutcome::NotFound);
        };

        let outcome = match change {
            AvailabilityChange::Borrow if book.available_copies <= 0 => {
                AdjustOutcome::NoCopiesAvailable
            }
            AvailabilityChange::Borrow => {
                book.available_copies -= 1;
                AdjustOutcome::Applied {
                    available_copies: book.available_copies,
                    status: BookStatus::for_copies(book.available_copies),
                }
            }
            AvailabilityChange::Return if book.available_copies >= book.total_copies => {
                AdjustOutcome::AtCapacity
            }
            AvailabilityChange::Return => {
                book.available_copies += 1;
                AdjustOutcome::Applied {
                    available_copies: book.available_copies,
                    status: BookStatus::for_copies(book.available_copies),
                }
            }
        };

        if let AdjustOutcome::Applied { status, .. } = outcome {
            book.status = status;
            book.updated_at = Utc::now();
        }
        Ok(outcome)
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio_test::{assert_err, assert_ok};

    fn new_book(total: i32, available: i32) -> NewBook {
        NewBook {
            book_id: "b-1".into(),
            title: "Cosmos".into(),
            author: "Carl Sagan".into(),
            category: "Science".into(),
            cover_image_url: None,
            total_copies: total,
            available_copies: Some(available),
        }
    }

    #[tokio::test]
    async fn test_insert_get_and_duplicate() {
        let catalog = MemoryCatalog::new();
        assert_ok!(catalog.insert_book(new_book(3, 3)).await);
        assert_eq!(assert_ok!(catalog.get_book("b-1").await).total_copies, 3);

        let err = assert_err!(catalog.insert_book(new_book(3, 3)).await);
        assert!(matches!(err, CatalogError::AlreadyExists(_)));
        assert!(matches!(
            catalog.get_book("nope").await,
            Err(CatalogError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_borrow_to_zero_then_return() {
        let catalog = MemoryCatalog::new();
        catalog.insert_book(new_book(3, 1)).await.unwrap();

        let outcome = assert_ok!(
            catalog
                .adjust_availability("b-1", AvailabilityChange::Borrow)
                .await
        );
        assert_eq!(
            outcome,
            AdjustOutcome::Applied {
                available_copies: 0,
                status: BookStatus::Unavailable
            }
        );
        assert_eq!(
            catalog
                .adjust_availability("b-1", AvailabilityChange::Borrow)
                .await
                .unwrap(),
            AdjustOutcome::NoCopiesAvailable
        );

        catalog
            .adjust_availability("b-1", AvailabilityChange::Return)
            .await
            .unwrap();
        let book = catalog.get_book("b-1").await.unwrap();
        assert_eq!(book.available_copies, 1);
        assert_eq!(book.status, BookStatus::Available);
    }

    #[tokio::test]
    async fn test_return_at_capacity_is_clamped() {
        let catalog = MemoryCatalog::new();
        catalog.insert_book(new_book(2, 2)).await.unwrap();

        let outcome = catalog
            .adjust_availability("b-1", AvailabilityChange::Return)
            .await
            .unwrap();
        assert_eq!(outcome, AdjustOutcome::AtCapacity);
        assert_eq!(catalog.get_book("b-1").await.unwrap().available_copies, 2);
    }

    #[tokio::test]
    async fn test_unknown_book_is_not_found_outcome() {
        let catalog = MemoryCatalog::new();
        let outcome = catalog
            .adjust_availability("ghost", AvailabilityChange::Borrow)
            .await
            .unwrap();
        assert_eq!(outcome, AdjustOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_concurrent_borrows_never_go_negative() {
        let catalog = Arc::new(MemoryCatalog::new());
        catalog.insert_book(new_book(5, 5)).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..20 {
            let catalog = catalog.clone();
            handles.push(tokio::spawn(async move {
                catalog
                    .adjust_availability("b-1", AvailabilityChange::Borrow)
                    .await
                    .unwrap()
            }));
        }

        let mut applied = 0;
        for handle in handles {
            if matches!(handle.await.unwrap(), AdjustOutcome::Applied { .. }) {
                applied += 1;
            }
        }
        assert_eq!(applied, 5);
        assert_eq!(catalog.get_book("b-1").await.unwrap().available_copies, 0);
    }

    #[tokio::test]
    async fn test_update_details_keeps_counts() {
        let catalog = MemoryCatalog::new();
        catalog.insert_book(new_book(3, 2)).await.unwrap();

        let book = catalog
            .update_details(
                "b-1",
                BookDetailsUpdate {
                    author: Some("C. Sagan".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(book.author, "C. Sagan");
        assert_eq!(book.available_copies, 2);
    }
}
