//! Source datasets for integration tests.

use migrator_core::store::{InMemoryStore, Item};
use serde_json::{json, Value};

pub fn item(value: Value) -> Item {
    value.as_object().cloned().expect("fixture must be a JSON object")
}

/// Seed a record keyed by its `id` field.
pub fn seed(store: &InMemoryStore, table: &str, value: Value) {
    let record = item(value);
    let id = record["id"].as_str().expect("fixture needs a string id").to_string();
    store.insert(table, &id, record);
}

/// A small connected dataset covering every standard table: two contacts,
/// one property, and one chain of request -> project -> quote -> quote items.
pub fn seed_standard_dataset(store: &InMemoryStore) {
    seed(store, "Contacts", json!({
        "id": "contact-agent",
        "email": "agent@example.com",
        "firstName": "Avery",
        "lastName": "Agent",
        "phone": "+15555550100",
        "createdAt": "2023-01-01T00:00:00.000Z",
        "updatedAt": "2023-01-02T00:00:00.000Z"
    }));
    seed(store, "Contacts", json!({
        "id": "contact-owner",
        "email": "owner@example.com",
        "firstName": "Harper",
        "lastName": "Owner",
        "company": null
    }));
    seed(store, "Properties", json!({
        "id": "property-1",
        "propertyFullAddress": "1 Main St, Springfield, IL 62701",
        "city": "Springfield",
        "state": "IL",
        "zip": "62701"
    }));
    seed(store, "Affiliates", json!({
        "id": "affiliate-1",
        "contactId": "contact-agent",
        "name": "Avery's Roofing",
        "email": "roof@example.com",
        "serviceType": "roofing"
    }));
    seed(store, "Requests", json!({
        "id": "request-1",
        "addressId": "property-1",
        "agentContactId": "contact-agent",
        "homeownerContactId": "contact-owner",
        "message": "Kitchen refresh before listing",
        "status": "submitted",
        "relationToProperty": "owner",
        "uploadedMedia": [{"url": "https://cdn.example.com/a.jpg", "size": 1024}]
    }));
    seed(store, "Projects", json!({
        "id": "project-1",
        "addressId": "property-1",
        "requestId": "request-1",
        "agentContactId": "contact-agent",
        "homeownerContactId": "contact-owner",
        "title": "Kitchen refresh",
        "status": "in-progress",
        "description": "Cabinets and counters",
        "budget": 12500.5
    }));
    seed(store, "Quotes", json!({
        "id": "quote-1",
        "projectId": "project-1",
        "requestId": "request-1",
        "addressId": "property-1",
        "agentContactId": "contact-agent",
        "title": "Kitchen quote",
        "status": "sent",
        "quoteNumber": 1001
    }));
    seed(store, "ProjectComments", json!({
        "id": "comment-1",
        "projectId": "project-1",
        "postedByContactId": "contact-owner",
        "comment": "Looks great!"
    }));
    seed(store, "ProjectMilestones", json!({
        "id": "milestone-1",
        "projectId": "project-1",
        "name": "Demo",
        "description": "Remove old cabinets",
        "order": 1
    }));
    seed(store, "ProjectPaymentTerms", json!({
        "id": "terms-1",
        "projectId": "project-1",
        "paymentName": "Deposit",
        "paymentAmount": 2500
    }));
    seed(store, "QuoteItems", json!({
        "id": "quote-item-1",
        "projectId": "project-1",
        "quoteId": "quote-1",
        "itemName": "Cabinets",
        "quantity": 12,
        "price": 450.0
    }));
    seed(store, "QuoteItems", json!({
        "id": "quote-item-2",
        "projectId": "project-1",
        "quoteId": "quote-1",
        "itemName": "Countertop",
        "quantity": 1,
        "price": 3200.0
    }));
}

/// Total records seeded by [`seed_standard_dataset`].
pub const STANDARD_DATASET_RECORDS: usize = 12;

/// Relationships in [`seed_standard_dataset`] that resolve in a full run.
pub const STANDARD_DATASET_RELATIONSHIPS: usize = 1 + 3 + 4 + 4 + 2 + 1 + 1 + 2 * 2;
