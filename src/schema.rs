// Diesel schema for the crawl store.
// Kept in sync by hand with the CREATE TABLE statements in repository/context.rs.

diesel::table! {
    crawl_urls (id) {
        id -> Integer,
        url -> Text,
        status -> Text,
        source -> Text,
        discovered_by -> Text,
        state_target -> Nullable<Text>,
        country -> Text,
        job_id -> Nullable<Text>,
        emails_found -> Integer,
        attempts -> Integer,
        error -> Nullable<Text>,
        claimed_by -> Nullable<Text>,
        claimed_at -> Nullable<Text>,
        created_at -> Text,
        processed_at -> Nullable<Text>,
        reclaims -> Integer,
    }
}

diesel::table! {
    contacts (id) {
        id -> Integer,
        email -> Text,
        farm_name -> Text,
        owner_name -> Text,
        phone -> Text,
        address -> Text,
        city -> Text,
        state -> Text,
        zip_code -> Text,
        country -> Text,
        website -> Text,
        facebook -> Text,
        instagram -> Text,
        cattle_type -> Text,
        breed -> Text,
        head_count -> Text,
        source_url -> Text,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    scrape_jobs (id) {
        id -> Text,
        job_type -> Text,
        country -> Text,
        states -> Text,
        seeds -> Text,
        status -> Text,
        query_index -> Integer,
        total_queries -> Integer,
        urls_discovered -> Integer,
        urls_processed -> Integer,
        emails_found -> Integer,
        cancel_requested -> Integer,
        error -> Nullable<Text>,
        created_at -> Text,
        started_at -> Nullable<Text>,
        completed_at -> Nullable<Text>,
    }
}

diesel::table! {
    search_queries (id) {
        id -> Integer,
        query -> Text,
        results_count -> Integer,
        urls_found -> Integer,
        job_id -> Nullable<Text>,
        executed_at -> Text,
    }
}

diesel::allow_tables_to_appear_in_same_query!(crawl_urls, contacts, scrape_jobs, search_queries,);
