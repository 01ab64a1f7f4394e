use uuid::Uuid;

/// Generates a fresh identifier in the same shape the teacher's
/// `stored_object!` entities use (`Uuid::new_v4().to_string()`), centralized
/// here so every entity constructor agrees on the representation.
#[must_use]
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}
