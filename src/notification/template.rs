//! Notification and email content for each notification type.
//!
//! Templates use `{{name}}` placeholders. Values are HTML-escaped when filling
//! the HTML email body; placeholders with no value are left untouched.

use serde_json::json;

use super::types::{NotificationType, Priority, Recipient};
use crate::channel::{BookBorrowed, BookReturned, CatalogEventData};
use crate::targeting::SubscriptionType;

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedNotification {
    pub title: String,
    pub message: String,
    pub priority: Priority,
    pub related_book_id: Option<String>,
    pub related_category_id: Option<String>,
    pub metadata: serde_json::Value,
    pub email: RenderedEmail,
}

/// Builds the per-recipient content of one fan-out run
pub trait NotificationTemplate: Send + Sync {
    fn notification_type(&self) -> NotificationType;

    fn render(&self, recipient: &Recipient) -> RenderedNotification;
}

/// Replace `{{name}}` placeholders in one pass
pub fn fill(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let name = after[..end].trim();
                match vars.iter().find(|(key, _)| *key == name) {
                    Some((_, value)) => out.push_str(value),
                    None => out.push_str(&rest[start..start + 2 + end + 2]),
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

pub fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

struct Copy {
    title: &'static str,
    message: &'static str,
    subject: &'static str,
    body: &'static str,
}

fn render_email(copy: &Copy, vars: &[(&str, &str)]) -> RenderedEmail {
    let escaped: Vec<(&str, String)> = vars.iter().map(|(k, v)| (*k, escape_html(v))).collect();
    let escaped_refs: Vec<(&str, &str)> = escaped.iter().map(|(k, v)| (*k, v.as_str())).collect();

    let text = fill(copy.body, vars);
    let html = format!(
        "<p>Hi {}</p><p>{}</p>",
        fill("{{name}},", &escaped_refs),
        fill(copy.body, &escaped_refs)
    );
    RenderedEmail {
        subject: fill(copy.subject, vars),
        html,
        text: format!("Hi {},\n\n{}", fill("{{name}}", vars), text),
    }
}

fn reason_line(reason: Option<SubscriptionType>) -> &'static str {
    match reason {
        Some(SubscriptionType::Category) => "You follow this category.",
        Some(SubscriptionType::Book) => "You follow this book.",
        Some(SubscriptionType::Both) => "You follow this book and its category.",
        None => "",
    }
}

const BOOK_ADDED: Copy = Copy {
    title: "New in {{category}}: {{title}}",
    message: "{{title}} by {{author}} was just added to {{category}}.",
    subject: "New book in {{category}}: {{title}}",
    body: "{{title}} by {{author}} was just added to {{category}}. {{reason}}",
};

const BOOK_UPDATED: Copy = Copy {
    title: "Updated: {{title}}",
    message: "Details for {{title}} by {{author}} have changed.",
    subject: "{{title}} was updated",
    body: "Details for {{title}} by {{author}} in {{category}} have changed. {{reason}}",
};

const BOOK_BORROWED: Copy = Copy {
    title: "You borrowed {{title}}",
    message: "{{title}} is due back on {{dueDate}}.",
    subject: "Borrow confirmation: {{title}}",
    body: "You borrowed {{title}} on {{borrowDate}}. Please return it by {{dueDate}}.",
};

const BOOK_RETURNED: Copy = Copy {
    title: "Returned {{title}}",
    message: "Thanks for returning {{title}}.",
    subject: "Return confirmation: {{title}}",
    body: "We received {{title}} on {{returnDate}}. Thanks for returning it.",
};

/// `BookAdded` and `BookUpdated`
pub struct CatalogTemplate {
    kind: NotificationType,
    book: CatalogEventData,
}

impl CatalogTemplate {
    pub fn added(book: CatalogEventData) -> Self {
        Self {
            kind: NotificationType::BookAdded,
            book,
        }
    }

    pub fn updated(book: CatalogEventData) -> Self {
        Self {
            kind: NotificationType::BookUpdated,
            book,
        }
    }
}

impl NotificationTemplate for CatalogTemplate {
    fn notification_type(&self) -> NotificationType {
        self.kind
    }

    fn render(&self, recipient: &Recipient) -> RenderedNotification {
        let (copy, priority) = match self.kind {
            NotificationType::BookUpdated => (&BOOK_UPDATED, Priority::Low),
            _ => (&BOOK_ADDED, Priority::Normal),
        };
        let vars = [
            ("name", recipient.name.as_str()),
            ("title", self.book.title.as_str()),
            ("author", self.book.author.as_str()),
            ("category", self.book.category.as_str()),
            ("reason", reason_line(recipient.reason)),
        ];

        RenderedNotification {
            title: fill(copy.title, &vars),
            message: fill(copy.message, &vars),
            priority,
            related_book_id: Some(self.book.book_id.clone()),
            related_category_id: None,
            metadata: json!({
                "bookTitle": self.book.title,
                "author": self.book.author,
                "category": self.book.category,
                "coverImageUrl": self.book.cover_image_url,
                "subscriptionType": recipient.reason,
            }),
            email: render_email(copy, &vars),
        }
    }
}

pub struct BorrowTemplate {
    event: BookBorrowed,
}

impl BorrowTemplate {
    pub fn new(event: BookBorrowed) -> Self {
        Self { event }
    }
}

impl NotificationTemplate for BorrowTemplate {
    fn notification_type(&self) -> NotificationType {
        NotificationType::BookBorrowed
    }

    fn render(&self, recipient: &Recipient) -> RenderedNotification {
        let due = self.event.due_date.format("%B %-d, %Y").to_string();
        let borrowed = self.event.borrow_date.format("%B %-d, %Y").to_string();
        let vars = [
            ("name", recipient.name.as_str()),
            ("title", self.event.book_title.as_str()),
            ("dueDate", due.as_str()),
            ("borrowDate", borrowed.as_str()),
        ];

        RenderedNotification {
            title: fill(BOOK_BORROWED.title, &vars),
            message: fill(BOOK_BORROWED.message, &vars),
            priority: Priority::High,
            related_book_id: Some(self.event.book_id.clone()),
            related_category_id: None,
            metadata: json!({
                "borrowId": self.event.borrow_id,
                "bookTitle": self.event.book_title,
                "dueDate": self.event.due_date,
            }),
            email: render_email(&BOOK_BORROWED, &vars),
        }
    }
}

pub struct ReturnTemplate {
    event: BookReturned,
    book_title: String,
}

impl ReturnTemplate {
    /// `book_title` comes from the catalog; the event itself does not carry it
    pub fn new(event: BookReturned, book_title: Option<String>) -> Self {
        let book_title = book_title.unwrap_or_else(|| "your book".to_string());
        Self { event, book_title }
    }
}

impl NotificationTemplate for ReturnTemplate {
    fn notification_type(&self) -> NotificationType {
        NotificationType::BookReturned
    }

    fn render(&self, recipient: &Recipient) -> RenderedNotification {
        let returned = self.event.return_date.format("%B %-d, %Y").to_string();
        let vars = [
            ("name", recipient.name.as_str()),
            ("title", self.book_title.as_str()),
            ("returnDate", returned.as_str()),
        ];

        RenderedNotification {
            title: fill(BOOK_RETURNED.title, &vars),
            message: fill(BOOK_RETURNED.message, &vars),
            priority: Priority::Normal,
            related_book_id: Some(self.event.book_id.clone()),
            related_category_id: None,
            metadata: json!({
                "borrowId": self.event.borrow_id,
                "returnDate": self.event.return_date,
            }),
            email: render_email(&BOOK_RETURNED, &vars),
        }
    }
}
