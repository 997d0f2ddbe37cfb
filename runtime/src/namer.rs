//! Random names for scratch containers and images.
//!
//! Collision avoidance only; the names are not meant to be unguessable.

use extender_core::config::NAME_PLACEHOLDER;
use rand::Rng;

/// Substitute `length` random lowercase letters into the template's
/// `%s` placeholder.
///
/// A template without a placeholder gets the letters appended.
pub fn random_name(template: &str, length: usize) -> String {
    let suffix = random_string(length);
    if template.contains(NAME_PLACEHOLDER) {
        template.replacen(NAME_PLACEHOLDER, &suffix, 1)
    } else {
        format!("{template}{suffix}")
    }
}

fn random_string(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| (b'a' + rng.gen_range(0..26u8)) as char)
        .collect()
}
