//! Esquema Diesel (mantenido a mano junto a `migrations/`).

diesel::table! {
    users (id) {
        id -> Uuid,
        email -> Text,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    runs (id) {
        id -> Uuid,
        user_id -> Uuid,
        trigger -> Text,
        status -> Text,
        pipeline_hash -> Text,
        created_at -> Timestamptz,
        finished_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    run_steps (id) {
        id -> Uuid,
        run_id -> Uuid,
        step_index -> Integer,
        step_key -> Text,
        handler_key -> Text,
        status -> Text,
        attempt -> Integer,
        started_at -> Nullable<Timestamptz>,
        finished_at -> Nullable<Timestamptz>,
        error -> Nullable<Text>,
    }
}

diesel::table! {
    artifacts (id) {
        id -> Uuid,
        seq -> BigInt,
        run_id -> Uuid,
        step_id -> Uuid,
        kind -> Text,
        payload -> Jsonb,
        payload_hash -> Text,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    step_tasks (id) {
        id -> BigInt,
        task_name -> Text,
        step_id -> Uuid,
        run_id -> Uuid,
        step_key -> Text,
        enqueued_at -> Timestamptz,
        reserved_until -> Nullable<Timestamptz>,
        deliveries -> Integer,
    }
}

diesel::joinable!(runs -> users (user_id));
diesel::joinable!(run_steps -> runs (run_id));
diesel::joinable!(artifacts -> run_steps (step_id));

diesel::allow_tables_to_appear_in_same_query!(users, runs, run_steps, artifacts, step_tasks);
