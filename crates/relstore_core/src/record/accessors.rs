//! Typed attribute accessors, one getter/setter pair per scalar kind and
//! array form. They all funnel through [`Record::scalar`] and
//! [`Record::array`].

use super::Record;
use crate::error::CoreResult;
use crate::value::Image;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

macro_rules! typed_accessors {
    ($($ty:ty => $kind:literal: $get:ident, $set:ident, $get_array:ident, $set_array:ident;)*) => {
        impl Record {
            $(
                #[doc = concat!("Reads a ", $kind, " attribute.")]
                pub fn $get(&self, name: &str) -> CoreResult<Option<$ty>> {
                    self.scalar::<$ty>(name)
                }

                #[doc = concat!("Writes a ", $kind, " attribute.")]
                pub fn $set(&self, name: &str, value: Option<$ty>) -> CoreResult<()> {
                    self.set_scalar::<$ty>(name, value)
                }

                #[doc = concat!("Reads a ", $kind, "[] attribute.")]
                pub fn $get_array(&self, name: &str) -> CoreResult<Option<Vec<$ty>>> {
                    self.array::<$ty>(name)
                }

                #[doc = concat!("Writes a ", $kind, "[] attribute.")]
                pub fn $set_array(&self, name: &str, values: Option<Vec<$ty>>) -> CoreResult<()> {
                    self.set_array::<$ty>(name, values)
                }
            )*
        }
    };
}

typed_accessors! {
    i64 => "integer": integer, set_integer, integer_array, set_integer_array;
    f64 => "decimal": decimal, set_decimal, decimal_array, set_decimal_array;
    String => "text": text, set_text, text_array, set_text_array;
    bool => "boolean": boolean, set_boolean, boolean_array, set_boolean_array;
    NaiveDate => "date": date, set_date, date_array, set_date_array;
    NaiveTime => "time": time, set_time, time_array, set_time_array;
    NaiveDateTime => "datetime": datetime, set_datetime, datetime_array, set_datetime_array;
    char => "character": character, set_character, character_array, set_character_array;
    Image => "image": image, set_image, image_array, set_image_array;
}
