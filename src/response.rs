//! Line-oriented reply the provider parses after delivering an IPN.
//!
//! Digistore24 reads the plain-text response body of your endpoint. A body
//! starting with `OK` acknowledges the notification; the following
//! `key: value` lines can hand back a thank-you URL, login credentials to
//! display to the buyer, and arbitrary extra data. The key names below are
//! part of that wire contract.

use crate::Error;
use url::Url;

/// Keys the wire format assigns meaning to; additional data must not
/// shadow them, with or without a numeric block suffix.
const RESERVED: [&str; 5] = ["thankyou_url", "headline", "username", "password", "loginurl"];

#[derive(Debug, Clone, PartialEq)]
struct LoginBlock {
    username: String,
    password: String,
    login_url: String,
}

/// Accumulates one outbound reply; serialize it exactly once at the end of
/// the request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseBuilder {
    thankyou_url: Option<Url>,
    headline: Option<String>,
    login_blocks: Vec<LoginBlock>,
    additional: Vec<(String, String)>,
}

impl ResponseBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the page the buyer is redirected to after checkout.
    ///
    /// The value must parse as an absolute URL; on failure the previously
    /// set value is left untouched.
    ///
    /// # Errors
    ///
    /// Returns an error when the value is not a well-formed URL
    pub fn set_thankyou_url(&mut self, value: &str) -> Result<&mut Self, Error> {
        let url = Url::parse(value).map_err(Error::InvalidThankyouUrl)?;
        self.thankyou_url = Some(url);
        Ok(self)
    }

    /// Set the headline shown above the order details
    pub fn set_headline(&mut self, value: impl Into<String>) -> &mut Self {
        self.headline = Some(value.into());
        self
    }

    /// Append one set of login credentials.
    ///
    /// Nothing is validated here; blocks with empty fields are rejected
    /// when the response is serialized.
    pub fn add_login_block(
        &mut self,
        username: impl Into<String>,
        password: impl Into<String>,
        login_url: impl Into<String>,
    ) -> &mut Self {
        self.login_blocks.push(LoginBlock {
            username: username.into(),
            password: password.into(),
            login_url: login_url.into(),
        });
        self
    }

    /// Attach an arbitrary `key: value` line.
    ///
    /// Re-inserting an existing key updates its value in place without
    /// changing its position.
    ///
    /// # Errors
    ///
    /// Returns an error when the key is reserved, either verbatim or as a
    /// reserved name with a `_<digits>` suffix
    pub fn set_additional_data(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<&mut Self, Error> {
        let key = key.into();
        if is_reserved(&key) {
            return Err(Error::ReservedKey(key));
        }
        let value = value.into();
        match self.additional.iter_mut().find(|(name, _)| *name == key) {
            Some(entry) => entry.1 = value,
            None => self.additional.push((key, value)),
        }
        Ok(self)
    }

    /// Render the response body.
    ///
    /// Lines are joined with a single newline and there is no trailing
    /// newline. The first login block serializes unsuffixed; later blocks
    /// get `_2`, `_3` and so on.
    ///
    /// # Errors
    ///
    /// Returns an error when a login block has an empty field
    pub fn serialize(&self) -> Result<String, Error> {
        let mut lines = vec!["OK".to_owned()];
        if let Some(url) = &self.thankyou_url {
            lines.push(format!("thankyou_url: {url}"));
        }
        for (index, block) in self.login_blocks.iter().enumerate() {
            if block.username.is_empty() || block.password.is_empty() || block.login_url.is_empty()
            {
                return Err(Error::IncompleteLoginBlock(index));
            }
            let suffix = if index == 0 {
                String::new()
            } else {
                format!("_{}", index + 1)
            };
            lines.push(format!("username{suffix}: {}", block.username));
            lines.push(format!("password{suffix}: {}", block.password));
            lines.push(format!("loginurl{suffix}: {}", block.login_url));
        }
        if let Some(headline) = &self.headline {
            lines.push(format!("headline: {headline}"));
        }
        for (key, value) in &self.additional {
            lines.push(format!("{key}: {value}"));
        }
        Ok(lines.join("\n"))
    }
}

/// Case-sensitive check against the reserved names and the
/// `name_<digits>` pattern the numbered login blocks occupy.
fn is_reserved(key: &str) -> bool {
    RESERVED.iter().any(|name| {
        key == *name
            || key
                .strip_prefix(name)
                .and_then(|rest| rest.strip_prefix('_'))
                .map_or(false, |digits| {
                    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
                })
    })
}
