use chrono::{DateTime, Utc};
use rusqlite::Connection;
use thiserror::Error;

use crate::storage::repository::{
    find_activity_by_natural_key, insert_activity, update_activity, Activity, User,
};
use crate::strava::SummaryActivity;

/// What a single reconcile did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Created,
    Updated,
    Unchanged,
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("unparseable start date for activity {provider_id}: {message}")]
    BadStartDate {
        provider_id: String,
        message: String,
    },

    #[error(transparent)]
    Db(#[from] rusqlite::Error),
}

fn to_record(user: &User, summary: &SummaryActivity) -> Result<Activity, ReconcileError> {
    let start_date: DateTime<Utc> = DateTime::parse_from_rfc3339(&summary.start_date)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| ReconcileError::BadStartDate {
            provider_id: summary.id.to_string(),
            message: e.to_string(),
        })?;

    Ok(Activity {
        id: 0,
        user_id: user.id,
        provider: user.provider.clone(),
        provider_id: summary.id.to_string(),
        name: summary.name.clone(),
        sport_type: summary.sport_type.clone(),
        start_date,
        distance: summary.distance.round() as i64,
        moving_time: summary.moving_time,
        elapsed_time: summary.elapsed_time,
    })
}

fn differs(stored: &Activity, incoming: &Activity) -> bool {
    stored.name != incoming.name
        || stored.sport_type != incoming.sport_type
        || stored.start_date != incoming.start_date
        || stored.distance != incoming.distance
        || stored.moving_time != incoming.moving_time
        || stored.elapsed_time != incoming.elapsed_time
}

/// Merge one fetched activity into the store, keyed by (provider, provider_id).
///
/// Missing records are inserted, changed records updated in place under their
/// existing internal id, identical records left alone. Running this twice with
/// the same input is a no-op the second time.
pub fn reconcile_activity(
    conn: &Connection,
    user: &User,
    summary: &SummaryActivity,
) -> Result<Outcome, ReconcileError> {
    let incoming = to_record(user, summary)?;

    match find_activity_by_natural_key(conn, &incoming.provider, &incoming.provider_id)? {
        None => {
            insert_activity(conn, &incoming)?;
            Ok(Outcome::Created)
        }
        Some(stored) if differs(&stored, &incoming) => {
            let merged = Activity {
                id: stored.id,
                user_id: stored.user_id,
                ..incoming
            };
            update_activity(conn, &merged)?;
            Ok(Outcome::Updated)
        }
        Some(_) => Ok(Outcome::Unchanged),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::repository::test_support::test_conn;
    use crate::storage::repository::{get_user, list_activities_for_user, upsert_user};

    fn setup() -> (Connection, User) {
        let conn = test_conn();
        let id = upsert_user(&conn, "ana", None, "strava", "42", "tok", "ref", None).unwrap();
        let user = get_user(&conn, id).unwrap().unwrap();
        (conn, user)
    }

    fn summary(id: u64, distance: f64) -> SummaryActivity {
        SummaryActivity {
            id,
            name: "Morning Run".into(),
            sport_type: "Run".into(),
            start_date: "2020-03-07T08:30:00Z".into(),
            distance,
            moving_time: 1500,
            elapsed_time: 1600,
        }
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let (conn, user) = setup();
        let s = summary(123, 5000.0);

        assert_eq!(reconcile_activity(&conn, &user, &s).unwrap(), Outcome::Created);
        assert_eq!(reconcile_activity(&conn, &user, &s).unwrap(), Outcome::Unchanged);
        assert_eq!(list_activities_for_user(&conn, user.id).unwrap().len(), 1);
    }

    #[test]
    fn test_reconcile_updates_in_place() {
        let (conn, user) = setup();

        reconcile_activity(&conn, &user, &summary(123, 5000.0)).unwrap();
        let before = list_activities_for_user(&conn, user.id).unwrap();

        assert_eq!(
            reconcile_activity(&conn, &user, &summary(123, 5200.0)).unwrap(),
            Outcome::Updated
        );

        let after = list_activities_for_user(&conn, user.id).unwrap();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].id, before[0].id);
        assert_eq!(after[0].distance, 5200);
    }

    #[test]
    fn test_reconcile_rounds_distance() {
        let (conn, user) = setup();
        reconcile_activity(&conn, &user, &summary(7, 5123.6)).unwrap();

        let stored = list_activities_for_user(&conn, user.id).unwrap();
        assert_eq!(stored[0].distance, 5124);
    }

    #[test]
    fn test_reconcile_rejects_bad_start_date() {
        let (conn, user) = setup();
        let mut s = summary(9, 1000.0);
        s.start_date = "not-a-date".into();

        let err = reconcile_activity(&conn, &user, &s).unwrap_err();
        assert!(matches!(err, ReconcileError::BadStartDate { .. }));
        assert!(list_activities_for_user(&conn, user.id).unwrap().is_empty());
    }
}
