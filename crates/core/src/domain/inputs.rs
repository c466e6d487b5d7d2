use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::RestaurantProfile;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct MenuImage {
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl MenuImage {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            filename: None,
            content_type: None,
            bytes,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct DishImage {
    pub dish_name: String,
    pub bytes: Vec<u8>,
}

/// Per-run inputs. Binary payloads are never persisted with the session.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(default)]
pub struct StageInputs {
    pub menu_images: Vec<MenuImage>,
    pub sales_csv: Option<String>,
    pub reviews: Vec<String>,
    pub dish_images: Vec<DishImage>,
    pub business_context: Option<String>,
    /// Overrides the persisted profile for this run when present.
    pub profile: Option<RestaurantProfile>,
}

impl StageInputs {
    pub fn with_menu_image(mut self, image: MenuImage) -> Self {
        self.menu_images.push(image);
        self
    }

    pub fn with_sales_csv(mut self, csv: impl Into<String>) -> Self {
        self.sales_csv = Some(csv.into());
        self
    }

    pub fn with_reviews(mut self, reviews: Vec<String>) -> Self {
        self.reviews = reviews;
        self
    }

    pub fn with_dish_image(mut self, image: DishImage) -> Self {
        self.dish_images.push(image);
        self
    }

    pub fn with_business_context(mut self, context: impl Into<String>) -> Self {
        self.business_context = Some(context.into());
        self
    }

    pub fn has_sales_csv(&self) -> bool {
        self.sales_csv
            .as_deref()
            .map(|csv| !csv.trim().is_empty())
            .unwrap_or(false)
    }

    pub fn has_business_context(&self) -> bool {
        self.business_context
            .as_deref()
            .map(|c| !c.trim().is_empty())
            .unwrap_or(false)
    }
}
