use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::ext::IdentExt;
use syn::{
    parse_macro_input, spanned::Spanned, Attribute, Data, DeriveInput, Fields, Ident, Path, Type,
};

#[proc_macro_derive(ClosureTableModel, attributes(closure_table))]
pub fn derive_closure_table_model(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match impl_closure_table_model(&input) {
        Ok(tokens) => tokens,
        Err(err) => err.to_compile_error().into(),
    }
}

#[derive(Default)]
struct Options {
    id_field: Option<String>,
    id_type: Option<Type>,
    closure_module: Option<Path>,
    closure_table: Option<String>,
    entity_name: Option<String>,
    ancestor_field: Option<String>,
    descendant_field: Option<String>,
    depth_field: Option<String>,
    position_field: Option<String>,
}

fn impl_closure_table_model(input: &DeriveInput) -> syn::Result<TokenStream> {
    let struct_ident = &input.ident;

    let data_struct = match &input.data {
        Data::Struct(data) => data,
        _ => {
            return Err(syn::Error::new(
                input.span(),
                "ClosureTableModel can only be derived for structs",
            ))
        }
    };

    let mut options = Options::default();
    let mut table_name: Option<String> = None;

    for attr in &input.attrs {
        if attr.path().is_ident("closure_table") {
            parse_closure_table_attr(attr, &mut options)?;
        }

        if attr.path().is_ident("sea_orm") {
            if let Some(name) = parse_sea_orm_table_name(attr)? {
                table_name = Some(name);
            }
        }
    }

    let id_field_name = options.id_field.unwrap_or_else(|| "id".to_string());
    let ancestor_field_name = options
        .ancestor_field
        .unwrap_or_else(|| "ancestor_id".to_string());
    let descendant_field_name = options
        .descendant_field
        .unwrap_or_else(|| "descendant_id".to_string());
    let depth_field_name = options.depth_field.unwrap_or_else(|| "depth".to_string());

    let id_field_ident = Ident::new(&id_field_name, struct_ident.span());
    let ancestor_field_ident = Ident::new(&ancestor_field_name, struct_ident.span());
    let descendant_field_ident = Ident::new(&descendant_field_name, struct_ident.span());
    let depth_field_ident = Ident::new(&depth_field_name, struct_ident.span());

    let mut id_field_type: Option<Type> = options.id_type.clone();

    if let Fields::Named(ref fields) = data_struct.fields {
        for field in &fields.named {
            if let Some(ident) = &field.ident {
                if ident == &id_field_ident && id_field_type.is_none() {
                    id_field_type = Some(field.ty.clone());
                }
            }
        }
    } else {
        return Err(syn::Error::new(
            data_struct.fields.span(),
            "ClosureTableModel requires named fields",
        ));
    }

    let id_type = id_field_type.ok_or_else(|| {
        syn::Error::new(
            struct_ident.span(),
            "Unable to determine id field type; specify `id_type = ...` in #[closure_table]",
        )
    })?;

    let closure_module_path = options
        .closure_module
        .ok_or_else(|| syn::Error::new(struct_ident.span(), "`closure_module` must be set"))?;

    let entity_name = options
        .entity_name
        .unwrap_or_else(|| struct_ident.unraw().to_string());

    let base_table = table_name.unwrap_or_else(|| struct_ident.unraw().to_string());
    let closure_table = options
        .closure_table
        .unwrap_or_else(|| format!("{}_closures", base_table));

    let id_column_variant = format_ident!("{}", to_pascal_case(&id_field_name));
    let ancestor_column_variant = format_ident!("{}", to_pascal_case(&ancestor_field_name));
    let descendant_column_variant = format_ident!("{}", to_pascal_case(&descendant_field_name));
    let depth_column_variant = format_ident!("{}", to_pascal_case(&depth_field_name));

    let closure_table_literal = syn::LitStr::new(&closure_table, struct_ident.span());
    let entity_name_literal = syn::LitStr::new(&entity_name, struct_ident.span());
    let ancestor_column_literal = syn::LitStr::new(&ancestor_field_name, struct_ident.span());
    let descendant_column_literal = syn::LitStr::new(&descendant_field_name, struct_ident.span());
    let depth_column_literal = syn::LitStr::new(&depth_field_name, struct_ident.span());

    let ordered_impl = options.position_field.as_deref().map(|position_field_name| {
        let position_field_ident = Ident::new(position_field_name, struct_ident.span());
        let position_column_variant = format_ident!("{}", to_pascal_case(position_field_name));
        quote! {
            impl ::closure_table::OrderedNodeModel for #struct_ident {
                fn position(&self) -> i64 {
                    self.#position_field_ident
                }

                fn set_position(active: &mut Self::ActiveModel, position: i64) {
                    active.#position_field_ident = ::sea_orm::ActiveValue::Set(position);
                }

                fn position_column() -> <Self::Entity as ::sea_orm::EntityTrait>::Column {
                    Column::#position_column_variant
                }
            }
        }
    });

    let generated = quote! {
        impl ::closure_table::ClosureTableModel for #struct_ident {
            type Entity = Entity;
            type ActiveModel = ActiveModel;
            type Id = #id_type;

            type ClosureEntity = #closure_module_path::Entity;
            type ClosureModel = #closure_module_path::Model;
            type ClosureActiveModel = #closure_module_path::ActiveModel;

            fn closure_table_schema() -> &'static ::closure_table::ClosureTableSchema {
                static SCHEMA: ::once_cell::sync::Lazy<::closure_table::ClosureTableSchema> =
                    ::once_cell::sync::Lazy::new(|| {
                        let base = ::closure_table::ClosureTableSchema::new(
                            #entity_name_literal,
                            #closure_table_literal,
                        );
                        ::closure_table::ClosureTableOptions::default()
                            .ancestor_column(#ancestor_column_literal)
                            .descendant_column(#descendant_column_literal)
                            .depth_column(#depth_column_literal)
                            .apply(base)
                    });
                &SCHEMA
            }

            fn id(&self) -> Self::Id {
                self.#id_field_ident.clone()
            }

            fn id_to_value(id: &Self::Id) -> ::sea_orm::Value {
                ::sea_orm::Value::from(id.clone())
            }

            fn id_column() -> <Self::Entity as ::sea_orm::EntityTrait>::Column {
                Column::#id_column_variant
            }

            fn closure_ancestor_column() -> <Self::ClosureEntity as ::sea_orm::EntityTrait>::Column {
                #closure_module_path::Column::#ancestor_column_variant
            }

            fn closure_descendant_column() -> <Self::ClosureEntity as ::sea_orm::EntityTrait>::Column {
                #closure_module_path::Column::#descendant_column_variant
            }

            fn closure_depth_column() -> <Self::ClosureEntity as ::sea_orm::EntityTrait>::Column {
                #closure_module_path::Column::#depth_column_variant
            }

            fn closure_model_ancestor(model: &Self::ClosureModel) -> Self::Id {
                model.#ancestor_field_ident.clone()
            }

            fn closure_model_descendant(model: &Self::ClosureModel) -> Self::Id {
                model.#descendant_field_ident.clone()
            }

            fn closure_model_depth(model: &Self::ClosureModel) -> i32 {
                model.#depth_field_ident
            }

            fn closure_build_row(
                ancestor: Self::Id,
                descendant: Self::Id,
                depth: i32,
            ) -> Self::ClosureActiveModel {
                #[allow(clippy::needless_update)]
                {
                    #closure_module_path::ActiveModel {
                        #ancestor_field_ident: ::sea_orm::ActiveValue::Set(ancestor),
                        #descendant_field_ident: ::sea_orm::ActiveValue::Set(descendant),
                        #depth_field_ident: ::sea_orm::ActiveValue::Set(depth),
                        ..::core::default::Default::default()
                    }
                }
            }
        }

        #ordered_impl
    };

    Ok(generated.into())
}

fn parse_closure_table_attr(attr: &Attribute, options: &mut Options) -> syn::Result<()> {
    attr.parse_nested_meta(|meta| {
        let ident = meta
            .path
            .get_ident()
            .ok_or_else(|| syn::Error::new(meta.path.span(), "Invalid option key"))?
            .to_string();

        match ident.as_str() {
            "id_field" => {
                let value: syn::LitStr = meta.value()?.parse()?;
                options.id_field = Some(value.value());
            }
            "closure_module" => {
                let value: syn::LitStr = meta.value()?.parse()?;
                options.closure_module = Some(parse_path(&value.value(), value.span())?);
            }
            "closure_table" => {
                let value: syn::LitStr = meta.value()?.parse()?;
                options.closure_table = Some(value.value());
            }
            "entity_name" => {
                let value: syn::LitStr = meta.value()?.parse()?;
                options.entity_name = Some(value.value());
            }
            "ancestor_field" => {
                let value: syn::LitStr = meta.value()?.parse()?;
                options.ancestor_field = Some(value.value());
            }
            "descendant_field" => {
                let value: syn::LitStr = meta.value()?.parse()?;
                options.descendant_field = Some(value.value());
            }
            "depth_field" => {
                let value: syn::LitStr = meta.value()?.parse()?;
                options.depth_field = Some(value.value());
            }
            "position_field" => {
                let value: syn::LitStr = meta.value()?.parse()?;
                options.position_field = Some(value.value());
            }
            "id_type" => {
                let ty: Type = meta.value()?.parse()?;
                options.id_type = Some(ty);
            }
            other => {
                return Err(syn::Error::new(
                    meta.path.span(),
                    format!("Unsupported closure_table option `{other}`"),
                ));
            }
        }

        Ok(())
    })
}

fn parse_sea_orm_table_name(attr: &Attribute) -> syn::Result<Option<String>> {
    let mut table_name: Option<String> = None;
    attr.parse_nested_meta(|meta| {
        if meta.path.is_ident("table_name") {
            let value: syn::LitStr = meta.value()?.parse()?;
            table_name = Some(value.value());
        }
        Ok(())
    })?;
    Ok(table_name)
}

fn parse_path(value: &str, span: proc_macro2::Span) -> syn::Result<Path> {
    syn::parse_str::<Path>(value).map_err(|_| syn::Error::new(span, "Invalid path"))
}

fn to_pascal_case(value: &str) -> String {
    value
        .split('_')
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            let mut chars = segment.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}
