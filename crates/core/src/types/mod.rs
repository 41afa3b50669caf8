//! Core types for Listly.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod category;
pub mod id;
pub mod item;
pub mod list;
pub mod member;
pub mod notification;
pub mod template;

pub use category::Category;
pub use id::*;
pub use item::{Comment, Item, PriceEntry};
pub use list::ShoppingList;
pub use member::{Member, MemberRole};
pub use notification::{Notification, NotificationKind};
pub use template::{ListTemplate, TemplateEntry};
