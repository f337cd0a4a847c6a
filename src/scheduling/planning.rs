//! Planning view assembly — the composite weekly snapshot.

use serde::Serialize;
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::scheduling::model::{Absence, Assignment, Member, Project};
use crate::scheduling::week::WeekWindow;
use crate::store::Store;

/// Optional narrowing of the weekly view.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanFilter {
    pub project_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
}

/// The composite weekly view consumed by the planning UI.
#[derive(Debug, Serialize)]
pub struct WeekPlan {
    pub resources: Vec<Member>,
    pub projects: Vec<Project>,
    pub assignments: Vec<Assignment>,
    pub absences: Vec<Absence>,
    pub week: WeekWindow,
}

/// Assemble the weekly view for one organization.
///
/// The four reads are mutually independent and run concurrently; if any one
/// fails the whole request fails — no partial views.
pub async fn week_plan(
    store: &dyn Store,
    org_id: Uuid,
    window: WeekWindow,
    filter: &PlanFilter,
) -> Result<WeekPlan, DatabaseError> {
    let (resources, projects, assignments, absences) = tokio::try_join!(
        store.list_active_members(org_id),
        store.list_open_projects(org_id, filter.project_id),
        store.list_assignments_starting_in(org_id, &window, filter.project_id, filter.user_id),
        store.list_absences_overlapping(org_id, &window, filter.user_id),
    )?;

    Ok(WeekPlan {
        resources,
        projects,
        assignments,
        absences,
        week: window,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::auth::Role;
    use crate::scheduling::model::{AbsenceKind, ProjectStatus};
    use crate::scheduling::week::resolve_week;
    use crate::store::LibSqlBackend;

    #[tokio::test]
    async fn assembles_all_four_sections() {
        let store = LibSqlBackend::new_memory().await.unwrap();
        let org = Uuid::new_v4();
        let window = resolve_week(Some("2025-W24"), Utc::now());

        let worker = Member::new(org, "Maja Lind", "maja@example.com", Role::Worker);
        store.insert_member(&worker).await.unwrap();
        let inactive = Member {
            active: false,
            ..Member::new(org, "Gone Person", "gone@example.com", Role::Worker)
        };
        store.insert_member(&inactive).await.unwrap();

        let project = Project::new(org, "Harbour");
        store.insert_project(&project).await.unwrap();
        let archived = Project {
            status: ProjectStatus::Archived,
            ..Project::new(org, "Old Works")
        };
        store.insert_project(&archived).await.unwrap();

        let in_week = Assignment::new(
            org,
            project.id,
            worker.id,
            Utc.with_ymd_and_hms(2025, 6, 10, 8, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 6, 10, 16, 0, 0).unwrap(),
            Uuid::new_v4(),
        );
        let out_of_week = Assignment::new(
            org,
            project.id,
            worker.id,
            Utc.with_ymd_and_hms(2025, 6, 20, 8, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 6, 20, 16, 0, 0).unwrap(),
            Uuid::new_v4(),
        );
        store
            .insert_assignments(&[in_week.clone(), out_of_week])
            .await
            .unwrap();

        // Absence starting before the week but overlapping into it.
        store
            .insert_absence(&Absence::new(
                org,
                worker.id,
                AbsenceKind::Vacation,
                Utc.with_ymd_and_hms(2025, 6, 5, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2025, 6, 10, 23, 59, 59).unwrap(),
            ))
            .await
            .unwrap();

        let plan = week_plan(&store, org, window, &PlanFilter::default())
            .await
            .unwrap();

        assert_eq!(plan.resources.len(), 1, "inactive members are excluded");
        assert_eq!(plan.projects.len(), 1, "archived projects are excluded");
        assert_eq!(plan.assignments.len(), 1, "only starts inside the window");
        assert_eq!(plan.assignments[0].id, in_week.id);
        assert_eq!(plan.absences.len(), 1, "overlapping absence included");
        assert_eq!(plan.week, window);
    }

    #[tokio::test]
    async fn filters_narrow_projects_and_workers() {
        let store = LibSqlBackend::new_memory().await.unwrap();
        let org = Uuid::new_v4();
        let window = resolve_week(Some("2025-W24"), Utc::now());

        let p1 = Project::new(org, "Harbour");
        let p2 = Project::new(org, "Bridge");
        store.insert_project(&p1).await.unwrap();
        store.insert_project(&p2).await.unwrap();

        let (u1, u2) = (Uuid::new_v4(), Uuid::new_v4());
        let start = Utc.with_ymd_and_hms(2025, 6, 10, 8, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 6, 10, 16, 0, 0).unwrap();
        store
            .insert_assignments(&[
                Assignment::new(org, p1.id, u1, start, end, Uuid::new_v4()),
                Assignment::new(org, p2.id, u2, start, end, Uuid::new_v4()),
            ])
            .await
            .unwrap();

        let filter = PlanFilter {
            project_id: Some(p1.id),
            user_id: Some(u1),
        };
        let plan = week_plan(&store, org, window, &filter).await.unwrap();

        assert_eq!(plan.projects.len(), 1);
        assert_eq!(plan.projects[0].id, p1.id);
        assert_eq!(plan.assignments.len(), 1);
        assert_eq!(plan.assignments[0].user_id, u1);
    }
}
