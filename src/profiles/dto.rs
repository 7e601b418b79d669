use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::profiles::repo::{Profile, ProfileFields};
use crate::validation::Validator;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRequest {
    pub bio: Option<String>,
    pub location: Option<String>,
    pub country: Option<String>,
    pub phone_number: Option<String>,
    pub profile_image: Option<String>,
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl ProfileRequest {
    /// Trim every field, drop blanks and enforce length/format limits.
    pub fn into_fields(self) -> Result<ProfileFields, AppError> {
        let fields = ProfileFields {
            bio: clean(self.bio),
            location: clean(self.location),
            country: clean(self.country),
            phone_number: clean(self.phone_number),
            profile_image: clean(self.profile_image),
        };

        let mut v = Validator::new();
        v.max_len("bio", fields.bio.as_deref(), 500)
            .max_len("location", fields.location.as_deref(), 100)
            .max_len("country", fields.country.as_deref(), 100)
            .phone("phoneNumber", fields.phone_number.as_deref())
            .url("profileImage", fields.profile_image.as_deref());
        v.finish()?;
        Ok(fields)
    }
}

#[derive(Debug, Serialize)]
pub struct ProfileEnvelope {
    pub profile: Profile,
}
