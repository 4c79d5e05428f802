use futures::StreamExt;
use std::sync::Arc;
use tome_catalog::ids::{BookId, JobId, LibraryId, PersonId, SeriesId};
use tome_catalog::Renamed;
use tome_catalog::models::{CoverAspectRatio, Job, JobFilter, JobStatus, NewLibrary};
use tome_jobs::{Housekeeper, JobRequest, WorkerPool, default_handlers, stream_logs};
use tome_library::{Editor, FileOrganizer, Organizer, Resolver};

use crate::app::{App, report};
use crate::cli::{Command, JobCommand, LibraryCommand, OrganizeArgs, PeopleCommand, SeriesCommand};

pub async fn run(app: App, command: Command) -> miette::Result<()> {
    match command {
        Command::Library(command) => library(&app, command).await,
        Command::Scan { library, wait } => scan(&app, library.map(LibraryId), wait).await,
        Command::Worker => worker(app).await,
        Command::Job(command) => job(&app, command).await,
        Command::Organize(args) => organize(&app, args).await,
        Command::People(command) => people(&app, command).await,
        Command::Series(SeriesCommand::Merge { target, source }) => {
            let merged = editor(&app).merge_series(SeriesId(target), SeriesId(source)).await.map_err(report)?;
            println!("merged series {source} into {} ({})", merged.id, merged.name.value);
            Ok(())
        },
        Command::Cleanup { library } => cleanup(&app, library.map(LibraryId)).await,
    }
}

fn editor(app: &App) -> Editor {
    Editor::new(app.ctx.clone(), Arc::new(Organizer::new(app.ctx.clone())))
}

async fn library(app: &App, command: LibraryCommand) -> miette::Result<()> {
    match command {
        LibraryCommand::Add {
            name,
            paths,
            organize,
            cover_aspect_ratio,
        } => {
            let cover_aspect_ratio: CoverAspectRatio = cover_aspect_ratio.parse().map_err(report)?;
            let paths = paths
                .into_iter()
                .map(|p| std::path::absolute(&p).map_err(|err| miette::miette!("{}: {err}", p.display())))
                .collect::<miette::Result<Vec<_>>>()?;
            let library = app
                .repo
                .create_library(&NewLibrary {
                    name,
                    paths,
                    organize_file_structure: organize,
                    cover_aspect_ratio,
                })
                .await
                .map_err(report)?;
            println!("created library {} ({})", library.id, library.name);
        },
        LibraryCommand::List => {
            for library in app.repo.list_libraries().await.map_err(report)? {
                let deleted = if library.deleted_at.is_some() { " [deleted]" } else { "" };
                println!("{:>4}  {}{deleted}", library.id, library.name);
            }
        },
        LibraryCommand::Show { id } => {
            let library = app.repo.library(LibraryId(id)).await.map_err(report)?;
            let books = app.repo.books_in_library(library.id).await.map_err(report)?;
            println!("id:        {}", library.id);
            println!("name:      {}", library.name);
            println!("organize:  {}", library.organize_file_structure);
            println!("covers:    {}", library.cover_aspect_ratio);
            println!("books:     {}", books.len());
            for path in &library.paths {
                println!("root:      {}", path.display());
            }
        },
    }
    Ok(())
}

async fn scan(app: &App, library_id: Option<LibraryId>, wait: bool) -> miette::Result<()> {
    let job = app.queue.enqueue(&JobRequest::scan(library_id)).await.map_err(report)?;
    if !wait {
        println!("queued scan job {}", job.id);
        return Ok(());
    }
    let pool = WorkerPool::new(app.queue.clone(), default_handlers(app.ctx.clone()), app.pool_config());
    pool.drain("cli").await.map_err(report)?;
    let job = app.queue.job(job.id).await.map_err(report)?;
    print_job(&job);
    match job.status {
        JobStatus::Succeeded => Ok(()),
        // Another process may still be running an older scan of this library.
        JobStatus::Queued => {
            println!("the scan is queued behind another job; a worker will pick it up");
            Ok(())
        },
        status => Err(miette::miette!("scan job {} ended as {status}", job.id)),
    }
}

async fn worker(app: App) -> miette::Result<()> {
    let pool = WorkerPool::new(app.queue.clone(), default_handlers(app.ctx.clone()), app.pool_config());
    let shutdown = pool.shutdown_token();
    let housekeeper = Housekeeper::new(
        app.repo.clone(),
        app.config.workers.log_retention(),
        app.config.workers.housekeeping_interval(),
    );
    let housekeeping = tokio::spawn(housekeeper.run(shutdown.clone()));
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted, finishing current jobs");
        }
        signal.cancel();
    });
    pool.run().await.map_err(report)?;
    shutdown.cancel();
    let _ = housekeeping.await;
    app.db.close().await;
    Ok(())
}

fn print_job(job: &Job) {
    println!("id:        {}", job.id);
    println!("type:      {}", job.job_type);
    println!("status:    {}", job.status);
    println!("progress:  {}%", job.progress);
    if let Some(library) = job.library_id {
        println!("library:   {library}");
    }
    println!("attempts:  {}", job.attempts);
    println!("created:   {:?}", job.created_at);
    if let Some(finished) = job.finished_at {
        println!("finished:  {finished:?}");
    }
    if let Some(result) = &job.result {
        println!("result:    {result}");
    }
    if let Some(error) = &job.error {
        println!("error:\n{error}");
    }
}

async fn job(app: &App, command: JobCommand) -> miette::Result<()> {
    match command {
        JobCommand::Show { id } => print_job(&app.queue.job(JobId(id)).await.map_err(report)?),
        JobCommand::Logs { id, follow } => {
            let poll = app.config.workers.poll_interval().min(std::time::Duration::from_secs(1));
            let mut lines = std::pin::pin!(stream_logs(app.repo.clone(), JobId(id), follow, poll));
            while let Some(line) = lines.next().await {
                let line = line.map_err(report)?;
                match &line.data {
                    Some(data) => println!("{:?} {:>5} {} {data}", line.created_at, line.level.as_str(), line.message),
                    None => println!("{:?} {:>5} {}", line.created_at, line.level.as_str(), line.message),
                }
                if let Some(trace) = &line.stack_trace {
                    println!("{trace}");
                }
            }
        },
        JobCommand::Cancel { id } => {
            let job = app.queue.cancel(JobId(id)).await.map_err(report)?;
            match (job.status, job.cancel_requested) {
                (JobStatus::Running, true) => println!("asked job {} to stop", job.id),
                (status, _) => println!("job {} is {status}", job.id),
            }
        },
        JobCommand::List { library, limit } => {
            let filter = JobFilter {
                library_id: library.map(LibraryId),
                limit: Some(limit),
                ..JobFilter::default()
            };
            for job in app.queue.list(&filter).await.map_err(report)? {
                let library = job.library_id.map_or_else(|| "all".to_string(), |l| l.to_string());
                println!("{:>6}  {:<9} {:<9} {:>3}%  library {library}", job.id, job.job_type, job.status.as_str(), job.progress);
            }
        },
    }
    Ok(())
}

async fn organize(app: &App, args: OrganizeArgs) -> miette::Result<()> {
    if let Some(book) = args.book {
        let organizer = Organizer::new(app.ctx.clone());
        let outcome = organizer.organize_book_files(BookId(book)).await.map_err(report)?;
        println!("{outcome:?}");
        return Ok(());
    }
    let Some(library) = args.library else {
        miette::bail!("either --book or --library is required");
    };
    let job = app.queue.enqueue(&JobRequest::organize(LibraryId(library), None)).await.map_err(report)?;
    println!("queued organize job {}", job.id);
    Ok(())
}

async fn people(app: &App, command: PeopleCommand) -> miette::Result<()> {
    match command {
        PeopleCommand::Merge { target, source } => {
            let merged = editor(app).merge_people(PersonId(target), PersonId(source)).await.map_err(report)?;
            println!("merged person {source} into {} ({})", merged.id, merged.name);
        },
        PeopleCommand::Rename { id, name } => match editor(app).rename_person(PersonId(id), &name).await.map_err(report)? {
            Renamed::Renamed(person) => println!("renamed person {} to {}", person.id, person.name),
            Renamed::Merged(person) => println!("merged person {id} into {} ({})", person.id, person.name),
        },
    }
    Ok(())
}

async fn cleanup(app: &App, library_id: Option<LibraryId>) -> miette::Result<()> {
    let libraries = match library_id {
        Some(id) => vec![id],
        None => app.repo.list_libraries().await.map_err(report)?.into_iter().map(|l| l.id).collect(),
    };
    let resolver = Resolver::new(&app.repo);
    for library_id in libraries {
        let cleanup = resolver.cleanup_orphans(library_id).await.map_err(report)?;
        println!("library {library_id}: removed {} people and {} series", cleanup.people, cleanup.series);
    }
    Ok(())
}
