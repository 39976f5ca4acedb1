//! Purpose: Hold top-level CLI command dispatch for `talabarteria`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: Every product command goes through one `ProductView` per invocation.
//! Invariants: Helpers in `main.rs` remain the source of output formatting.

use super::*;

pub(super) fn dispatch_command(
    command: Command,
    target: StoreTarget,
    color_mode: ColorMode,
) -> Result<RunOutcome, Error> {
    match command {
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "talabarteria", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
        Command::Version => {
            emit_version_output();
            Ok(RunOutcome::ok())
        }
        Command::List { query } => {
            let view = ProductView::new(target.open()?);
            view.refresh()?;
            view.set_query(query.unwrap_or_default());
            view.recalculate();
            let products = view.visible().iter().map(product_json).collect::<Vec<_>>();
            emit_json(json!({
                "query": view.query(),
                "total": view.products().len(),
                "products": products,
            }));
            Ok(RunOutcome::ok())
        }
        Command::Add(args) => {
            let view = ProductView::new(target.open()?);
            let (draft, require_image) = draft_from_add(args);
            let id = view
                .create(&draft, require_image)
                .map_err(add_validation_hint)?;
            let product = find_product(&view, &id).map(|product| product_json(&product));
            emit_json(json!({ "id": id, "product": product }));
            Ok(RunOutcome::ok())
        }
        Command::Edit(args) => {
            let view = ProductView::new(target.open()?);
            let id = args.id.clone();
            let stored = view.store().get_product(&id).map_err(add_not_found_hint)?;
            let draft = apply_edit(ProductDraft::from_product(&stored), args);
            view.update(&id, &draft)
                .map_err(add_validation_hint)
                .map_err(add_not_found_hint)?;
            let product = view.store().get_product(&id)?;
            emit_json(json!({ "id": id, "product": product_json(&product) }));
            Ok(RunOutcome::ok())
        }
        Command::Delete { id } => {
            let view = ProductView::new(target.open()?);
            view.delete(&id)?;
            emit_json(json!({ "ok": true, "id": id }));
            Ok(RunOutcome::ok())
        }
        Command::Stats { export } => {
            let view = ProductView::new(target.open()?);
            let total_products = view.refresh()?;
            let totals = view.categories();
            let counted = view
                .products()
                .iter()
                .filter(|product| talabarteria::core::filter::is_aggregatable(product))
                .count();
            if let Some(notice) = skipped_products_notice(total_products - counted, &target) {
                emit_notice(&notice, color_mode);
            }
            if let Some(path) = &export {
                talabarteria::core::export::write_category_report(path, &totals)?;
            }
            let categories = totals.iter().map(category_json).collect::<Vec<_>>();
            emit_json(json!({
                "products": total_products,
                "counted": counted,
                "categories": categories,
                "export": export.as_ref().map(|path| path.display().to_string()),
            }));
            Ok(RunOutcome::ok())
        }
        Command::Serve(args) => {
            if target.remote.is_some() {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message("serve cannot be combined with --remote")
                    .with_hint("Unset --remote (or TALABARTERIA_REMOTE) to serve the local data directory."));
            }
            let config = serve::ServeConfig {
                bind: parse_bind(&args.bind)?,
                data_dir: target.data_dir,
                token: args.token,
                allow_non_loopback: args.allow_non_loopback,
                max_body_bytes: args.max_body_bytes,
            };
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .map_err(|err| {
                    Error::new(ErrorKind::Internal)
                        .with_message("failed to start runtime")
                        .with_source(err)
                })?;
            runtime.block_on(serve::serve(config))?;
            Ok(RunOutcome::ok())
        }
    }
}
