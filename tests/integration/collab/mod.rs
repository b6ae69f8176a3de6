mod convergence;
mod end_to_end;
mod restart;
mod snapshot_cadence;
