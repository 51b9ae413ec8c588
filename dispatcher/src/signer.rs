//! Request signatures.
//!
//! Every signature is the lowercase hex MD5 digest of an ordered concatenation of request
//! fields and the shared secret. Phones are concatenated in batch order without a separator,
//! so reordering a batch changes its signature.

/// Operation name prefixed to lookup signatures.
pub const LOOKUP_ACTION: &str = "phone_info";

fn digest(parts: &[&str]) -> String {
    let mut context = md5::Context::new();
    for part in parts {
        context.consume(part.as_bytes());
    }
    format!("{:x}", context.compute())
}

/// Sign a message batch.
pub fn message(user: &str, from: &str, phones: &[String], text: &str, secret: &str) -> String {
    let phones = phones.concat();
    digest(&[user, from, &phones, text, secret])
}

/// Sign a lookup batch.
pub fn lookup(user: &str, phones: &[String], secret: &str) -> String {
    let phones = phones.concat();
    digest(&[LOOKUP_ACTION, user, &phones, secret])
}

/// Sign an image upload.
pub fn upload(user: &str, content: &[u8], secret: &str) -> String {
    let content = format!("{:x}", md5::compute(content));
    digest(&[user, &content, secret])
}
