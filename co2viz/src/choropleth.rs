//! Per-year aggregation of emissions and its join onto the world geometry.

use log::debug;
use polars::lazy::dsl::col;
use polars::prelude::*;

use crate::error::Co2VizResult;
use crate::selection::year_expr;
use crate::world::World;
use crate::COL;

/// One row per code with the summed CO2 of `year`. Codes without any value that year are absent
/// rather than zero.
pub fn aggregate_year(df: &DataFrame, year: i32) -> PolarsResult<DataFrame> {
    df.clone()
        .lazy()
        .filter(year_expr(year).and(col(COL::CO2).is_not_null()))
        .group_by_stable([col(COL::CODE)])
        .agg([col(COL::CO2).sum()])
        .collect()
}

/// The world table left-joined with one year of aggregated emissions.
///
/// Holds exactly one row per world code. `co2` is null and `has_data` false for codes without
/// emissions that year.
#[derive(Debug, Clone)]
pub struct JoinedYear {
    pub year: i32,
    pub df: DataFrame,
}

impl JoinedYear {
    pub fn as_df(&self) -> &DataFrame {
        &self.df
    }

    fn filter_has_data(&self, has_data: bool) -> PolarsResult<DataFrame> {
        self.df
            .clone()
            .lazy()
            .filter(col(COL::HAS_DATA).eq(lit(has_data)))
            .collect()
    }

    /// Rows with emissions data.
    pub fn with_data(&self) -> PolarsResult<DataFrame> {
        self.filter_has_data(true)
    }

    /// Rows rendered in the neutral colour.
    pub fn without_data(&self) -> PolarsResult<DataFrame> {
        self.filter_has_data(false)
    }

    /// (with data, without data); the two frames are disjoint and together hold every row.
    pub fn partition(&self) -> PolarsResult<(DataFrame, DataFrame)> {
        Ok((self.with_data()?, self.without_data()?))
    }
}

pub fn join_year(world: &World, df: &DataFrame, year: i32) -> Co2VizResult<JoinedYear> {
    let aggregate = aggregate_year(df, year)?;
    debug!("Aggregated {} codes for {year}", aggregate.height());
    let joined = world
        .as_df()
        .clone()
        .lazy()
        .join(
            aggregate.lazy(),
            [col(COL::CODE)],
            [col(COL::CODE)],
            JoinArgs::new(JoinType::Left),
        )
        .with_column(col(COL::CO2).is_not_null().alias(COL::HAS_DATA))
        .collect()?;
    Ok(JoinedYear { year, df: joined })
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use polars::df;

    use super::*;
    use crate::selection::tests::test_emissions;
    use crate::world::tests::test_world;

    fn codes(df: &DataFrame) -> Vec<String> {
        df.column(COL::CODE)
            .unwrap()
            .str()
            .unwrap()
            .into_no_null_iter()
            .map(|code| code.to_string())
            .collect()
    }

    #[test]
    fn aggregation_sums_duplicate_codes() -> anyhow::Result<()> {
        let df = df!(
            COL::COUNTRY => &["Chile", "Chile (mainland)", "Peru", "Peru"],
            COL::CODE => &["CHL", "CHL", "PER", "PER"],
            COL::YEAR => &[2020i32, 2020, 2020, 2019],
            COL::CO2 => &[Some(70.0), Some(10.0), None, Some(50.0)]
        )?;
        let aggregate = aggregate_year(&df, 2020)?;
        assert_eq!(codes(&aggregate), vec!["CHL"], "Peru has no 2020 value");
        assert_eq!(aggregate.column(COL::CO2)?.f64()?.get(0), Some(80.0));
        Ok(())
    }

    #[test]
    fn joined_has_one_row_per_world_code() -> anyhow::Result<()> {
        let world = test_world();
        let emissions = test_emissions();
        for year in [2019, 2020, 1900] {
            let joined = join_year(&world, &emissions, year)?;
            let mut joined_codes = codes(joined.as_df());
            joined_codes.sort();
            let mut world_codes = world.codes()?;
            world_codes.sort();
            assert_eq!(joined_codes, world_codes);
        }
        Ok(())
    }

    #[test]
    fn partition_is_disjoint_and_exhaustive() -> anyhow::Result<()> {
        let world = test_world();
        let joined = join_year(&world, &test_emissions(), 2019)?;
        let (with, without) = joined.partition()?;
        let with: HashSet<String> = codes(&with).into_iter().collect();
        let without: HashSet<String> = codes(&without).into_iter().collect();
        assert!(with.is_disjoint(&without));
        let all: HashSet<String> = with.union(&without).cloned().collect();
        assert_eq!(all, world.codes()?.into_iter().collect());
        // Peru has a null value in 2019 and Brazil is not in the world table
        assert_eq!(with, HashSet::from(["CHL".to_string(), "ARG".to_string()]));
        assert_eq!(without, HashSet::from(["PER".to_string()]));
        Ok(())
    }

    #[test]
    fn absent_codes_have_null_co2() -> anyhow::Result<()> {
        let joined = join_year(&test_world(), &test_emissions(), 1900)?;
        assert_eq!(joined.as_df().column(COL::CO2)?.null_count(), joined.as_df().height());
        assert_eq!(joined.with_data()?.height(), 0);
        Ok(())
    }
}
