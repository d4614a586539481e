// Keep in sync with the migrations, diesel cannot infer SQLite schemas at compile time

diesel::table! {
    plant (id) {
        id -> BigInt,
        common_name -> Text,
        first_nations_name -> Nullable<Text>,
        scientific_name -> Text,
        first_nations_uses -> Nullable<Text>,
        description -> Nullable<Text>,
        latitude -> Nullable<Double>,
        longitude -> Nullable<Double>,
        kml_file -> Nullable<Binary>,
        conservation_status -> Nullable<Text>,
        image -> Nullable<Binary>,
    }
}
